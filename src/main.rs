use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use addrbook::bridge;
use addrbook::config::{self, Config};
use addrbook::contact::ContactField;
use addrbook::db::Database;
use addrbook::import::{self, ImportOutcome};
use addrbook::search;
use addrbook::service::{ContactService, Event, Outcome, ServiceHandle};
use addrbook::store::{ContactStore, SortMode};

#[derive(Parser, Debug)]
#[command(name = "addrbook")]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import contacts from an AddressBook XML file
    Import(ImportArgs),
    /// List contacts (id<TAB>name<TAB>email)
    List(ListArgs),
    /// Add a contact
    Add(AddArgs),
    /// Delete a contact by id
    Delete(DeleteArgs),
    /// Print all contacts as JSON
    Export,
}

#[derive(Args, Debug)]
struct ImportArgs {
    #[arg(value_name = "PATH")]
    input: PathBuf,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long, value_enum)]
    sort: Option<SortArg>,

    /// Case-insensitive match against name and email
    #[arg(long)]
    query: Option<String>,
}

#[derive(Args, Debug)]
struct AddArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    customer_id: Option<String>,
    #[arg(long)]
    company: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    postal_code: Option<String>,
    #[arg(long)]
    country: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    fax: Option<String>,
}

impl AddArgs {
    fn fields(self) -> Vec<(ContactField, String)> {
        let optional = [
            (ContactField::CustomerId, self.customer_id),
            (ContactField::CompanyName, self.company),
            (ContactField::ContactTitle, self.title),
            (ContactField::Address, self.address),
            (ContactField::City, self.city),
            (ContactField::PostalCode, self.postal_code),
            (ContactField::Country, self.country),
            (ContactField::Phone, self.phone),
            (ContactField::Fax, self.fax),
        ];

        let mut fields = vec![
            (ContactField::ContactName, self.name),
            (ContactField::Email, self.email),
        ];
        fields.extend(
            optional
                .into_iter()
                .filter_map(|(field, value)| value.map(|value| (field, value))),
        );
        fields
    }
}

#[derive(Args, Debug)]
struct DeleteArgs {
    id: i64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SortArg {
    Name,
    Email,
}

impl From<SortArg> for SortMode {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortMode::Name,
            SortArg::Email => SortMode::Email,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;
    let db = Database::open(&config.db_path)?;

    match cli.command {
        Command::Import(args) => handle_import(&args.input, &config, db).await,
        Command::List(args) => handle_list(args, &config, &db).await,
        Command::Add(args) => handle_add(args, &config, db).await,
        Command::Delete(args) => handle_delete(args.id, &config, db).await,
        Command::Export => handle_export(&db).await,
    }
}

fn start_service(config: &Config, db: Database) -> ServiceHandle {
    ContactService::spawn(Arc::new(db), config.service_config())
}

async fn handle_import(input: &Path, config: &Config, db: Database) -> Result<()> {
    let content = fs::read_to_string(input)
        .with_context(|| format!("failed to read import file at {}", input.display()))?;

    let outcome = import::parse_contacts_xml(&content);
    match &outcome {
        ImportOutcome::Success { .. } => {}
        // anyhow already prefixes the report with "Error: "
        ImportOutcome::Error { message } => bail!("{}", message),
        other => bail!("{}", other.user_message()),
    }

    let handle = start_service(config, db);
    let summary = import::apply_import(&handle, &outcome).await?;

    println!("{}", import::success_message(summary.saved));
    if summary.rejected > 0 {
        println!(
            "Skipped {} contacts (duplicate name or storage error).",
            summary.rejected
        );
    }
    Ok(())
}

async fn handle_list(args: ListArgs, config: &Config, db: &Database) -> Result<()> {
    let sort = args.sort.map(SortMode::from).unwrap_or(config.sort);
    let contacts = db.list_sorted(sort).await?;
    let query = args.query.unwrap_or_default();

    for contact in search::filter_contacts(&contacts, &query) {
        println!(
            "{}\t{}\t{}",
            contact.id, contact.contact_name, contact.email
        );
    }
    Ok(())
}

async fn handle_add(args: AddArgs, config: &Config, db: Database) -> Result<()> {
    let handle = start_service(config, db);

    handle.dispatch(Event::ShowAddDialog).await?;
    for (field, value) in args.fields() {
        handle.dispatch(Event::SetField(field, value)).await?;
    }
    let result = handle.dispatch(Event::SaveDraft).await?;

    match result.outcome {
        Outcome::Saved(contact) => {
            println!("Added {} ({})", contact.contact_name, contact.id);
            Ok(())
        }
        Outcome::Rejected(message) | Outcome::Failed(message) => bail!("{}", message),
        other => bail!("contact was not saved: {:?}", other),
    }
}

async fn handle_delete(id: i64, config: &Config, db: Database) -> Result<()> {
    let handle = start_service(config, db);
    let result = handle.dispatch(Event::DeleteById(id)).await?;

    match result.outcome {
        Outcome::Applied => {
            println!("Deleted contact {}", id);
            Ok(())
        }
        Outcome::Rejected(message) | Outcome::Failed(message) => bail!("{}", message),
        other => bail!("contact {} was not deleted: {:?}", id, other),
    }
}

async fn handle_export(db: &Database) -> Result<()> {
    let contacts = db.list_sorted(SortMode::Name).await?;
    println!("{}", bridge::contacts_to_json(&contacts)?);
    Ok(())
}

//! Integration tests for the addrbook command-line interface

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command as AssertCommand;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// Test environment with an isolated config file and database
struct TestEnv {
    temp_dir: TempDir,
    config_path: PathBuf,
    db_path: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        Self::with_settings("")
    }

    /// Create an environment whose config.toml carries `extra` after db_path
    fn with_settings(extra: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let db_path = temp_dir.path().join("contacts.db");

        let config = format!("db_path = {:?}\n{}", db_path.to_str().unwrap(), extra);
        fs::write(&config_path, config).unwrap();

        Self {
            temp_dir,
            config_path,
            db_path,
        }
    }

    /// Run addrbook with this test env's config
    fn addrbook(&self) -> AssertCommand {
        let mut cmd = addrbook_cmd();
        cmd.args(["--config", self.config_path.to_str().unwrap()]);
        cmd
    }

    fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn import_sample(&self) {
        self.addrbook()
            .args(["import", sample_xml_path().to_str().unwrap()])
            .assert()
            .success();
    }

    fn add(&self, name: &str, email: &str) -> assert_cmd::assert::Assert {
        self.addrbook()
            .args(["add", "--name", name, "--email", email])
            .assert()
    }

    fn list_stdout(&self, args: &[&str]) -> String {
        let output = self.addrbook().arg("list").args(args).output().unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap()
    }
}

/// Get the addrbook binary command
fn addrbook_cmd() -> AssertCommand {
    AssertCommand::cargo_bin("addrbook").unwrap()
}

/// Path to test data directory
fn test_data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
}

/// Sample AddressBook document: three valid contacts and one with a bad email
fn sample_xml_path() -> PathBuf {
    test_data_dir().join("address_book.xml")
}

/// Names column of `list` output, in order
fn names(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| line.split('\t').nth(1))
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Import Tests
// =============================================================================

#[test]
fn test_import_sample_document() {
    let env = TestEnv::new();

    env.addrbook()
        .args(["import", sample_xml_path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Successfully imported 3 contacts"));

    assert!(env.db_path.exists());
    assert_eq!(
        names(&env.list_stdout(&[])),
        vec!["Ana Trujillo", "Maria Anders", "Thomas Hardy"]
    );
}

#[test]
fn test_import_twice_skips_duplicate_names() {
    let env = TestEnv::new();
    env.import_sample();

    env.addrbook()
        .args(["import", sample_xml_path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Successfully imported 0 contacts"))
        .stdout(predicate::str::contains("Skipped 3 contacts"));

    assert_eq!(names(&env.list_stdout(&[])).len(), 3);
}

#[test]
fn test_import_empty_file_fails() {
    let env = TestEnv::new();
    let path = env.write_file("empty.xml", "   \n");

    env.addrbook()
        .args(["import", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "The file is empty or contains no valid contacts",
        ));
}

#[test]
fn test_import_wrong_root_fails() {
    let env = TestEnv::new();
    let path = env.write_file(
        "people.xml",
        "<People><Contact><ContactName>Ann</ContactName></Contact></People>",
    );

    env.addrbook()
        .args(["import", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid XML format"));
}

#[test]
fn test_import_truncated_document_fails() {
    let env = TestEnv::new();
    let path = env.write_file(
        "truncated.xml",
        "<AddressBook><Contact><ContactName>Ann</ContactName>",
    );

    env.addrbook()
        .args(["import", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: "))
        .stderr(predicate::str::contains("Contact"))
        .stderr(predicate::str::contains("Error: Error:").not());

    assert!(env.list_stdout(&[]).is_empty());
}

#[test]
fn test_import_missing_file_fails() {
    let env = TestEnv::new();

    env.addrbook()
        .args(["import", "/nonexistent/contacts.xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read import file"));
}

// =============================================================================
// List Tests
// =============================================================================

#[test]
fn test_list_sorted_by_email() {
    let env = TestEnv::new();
    env.add("Zed", "aaron@example.com").success();
    env.add("Amy", "zoe@example.com").success();

    assert_eq!(names(&env.list_stdout(&[])), vec!["Amy", "Zed"]);
    assert_eq!(
        names(&env.list_stdout(&["--sort", "email"])),
        vec!["Zed", "Amy"]
    );
}

#[test]
fn test_list_uses_configured_sort() {
    let env = TestEnv::with_settings("sort = \"email\"\n");
    env.add("Zed", "aaron@example.com").success();
    env.add("Amy", "zoe@example.com").success();

    assert_eq!(names(&env.list_stdout(&[])), vec!["Zed", "Amy"]);
}

#[test]
fn test_list_query_matches_name_or_email() {
    let env = TestEnv::new();
    env.import_sample();

    assert_eq!(
        names(&env.list_stdout(&["--query", "  ANDERS "])),
        vec!["Maria Anders"]
    );
    assert_eq!(
        names(&env.list_stdout(&["--query", "hardy@"])),
        vec!["Thomas Hardy"]
    );
    assert!(env.list_stdout(&["--query", "nobody"]).is_empty());
}

#[test]
fn test_list_empty_database() {
    let env = TestEnv::new();

    env.addrbook()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// =============================================================================
// Add / Delete Tests
// =============================================================================

#[test]
fn test_add_with_optional_fields() {
    let env = TestEnv::new();

    env.addrbook()
        .args([
            "add",
            "--name",
            "Ann Lee",
            "--email",
            "ann@example.com",
            "--company",
            "Acme",
            "--city",
            "Oslo",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added Ann Lee"));

    env.addrbook()
        .arg("export")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"companyName\":\"Acme\""))
        .stdout(predicate::str::contains("\"city\":\"Oslo\""));
}

#[test]
fn test_add_rejects_invalid_email() {
    let env = TestEnv::new();

    env.add("Ann", "not-an-email")
        .failure()
        .stderr(predicate::str::contains("Invalid email format"));

    assert!(env.list_stdout(&[]).is_empty());
}

#[test]
fn test_add_rejects_blank_name() {
    let env = TestEnv::new();

    env.add("   ", "ann@example.com")
        .failure()
        .stderr(predicate::str::contains("Name is required"));
}

#[test]
fn test_add_rejects_duplicate_name() {
    let env = TestEnv::new();
    env.add("Ann", "ann@example.com").success();

    env.add("Ann", "other@example.com")
        .failure()
        .stderr(predicate::str::contains(
            "A contact with this name already exists",
        ));
}

#[test]
fn test_duplicate_names_ignore_case_setting() {
    let exact = TestEnv::new();
    exact.add("Ann", "ann@example.com").success();
    exact.add("ANN", "ann2@example.com").success();

    let relaxed = TestEnv::with_settings("duplicate_names = \"ignore_case\"\n");
    relaxed.add("Ann", "ann@example.com").success();
    relaxed
        .add("ANN", "ann2@example.com")
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_delete_by_id() {
    let env = TestEnv::new();
    env.add("Ann", "ann@example.com").success();
    env.add("Bob", "bob@example.com").success();

    let listing = env.list_stdout(&["--query", "bob"]);
    let id = listing.split('\t').next().unwrap().to_string();

    env.addrbook()
        .args(["delete", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Deleted contact {}", id)));

    assert_eq!(names(&env.list_stdout(&[])), vec!["Ann"]);
}

#[test]
fn test_delete_unknown_id_fails() {
    let env = TestEnv::new();

    env.addrbook()
        .args(["delete", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no contact with id 42"));
}

// =============================================================================
// Export / Config Tests
// =============================================================================

#[test]
fn test_export_uses_wire_names() {
    let env = TestEnv::new();
    env.import_sample();

    env.addrbook()
        .arg("export")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("["))
        .stdout(predicate::str::contains("\"customerID\":\"ALFKI\""))
        .stdout(predicate::str::contains("\"contactName\":\"Maria Anders\""))
        .stdout(predicate::str::contains("\"postalCode\":\"05021\""));
}

#[test]
fn test_invalid_config_value_fails() {
    let env = TestEnv::with_settings("sort = \"phone\"\n");

    env.addrbook()
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid sort 'phone'"));
}

#[test]
fn test_unknown_config_key_warns() {
    let env = TestEnv::with_settings("theme = \"dark\"\n");

    env.addrbook()
        .arg("list")
        .assert()
        .success()
        .stderr(predicate::str::contains("unknown configuration key"));
}

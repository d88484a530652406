//! Integration tests for the cadventory CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to get a cadventory command isolated from the user's environment
fn cadventory(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cadventory").unwrap();
    cmd.current_dir(tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path().join(".xdg"))
        .env_remove("CADVENTORY_LIBRARY")
        .env_remove("CADVENTORY_TAGGER")
        .env_remove("CADVENTORY_EXTRACTOR")
        .env_remove("CADVENTORY_LOG");
    cmd
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Helper to create a library with a few models in a temp directory
fn setup_library() -> TempDir {
    let tmp = TempDir::new().unwrap();
    cadventory(&tmp).arg("init").assert().success();
    fs::write(
        tmp.path().join(".cadventory/config.yaml"),
        "extractor:\n  max_depth: 2\n  timeout_secs: 20\n",
    )
    .unwrap();
    write(tmp.path(), "models/m35.g", "m35 geometry");
    write(tmp.path(), "models/m35.png", "not really a png");
    write(tmp.path(), "models/tank.g", "tank geometry");
    write(tmp.path(), "models/broken.g", "garbage");
    tmp
}

/// A stand-in for mged that names objects after the file and fails on "broken"
#[cfg(unix)]
fn fake_mged(tmp: &TempDir) -> String {
    use std::os::unix::fs::PermissionsExt;

    let script = tmp.path().join(".xdg/fake-mged");
    fs::create_dir_all(script.parent().unwrap()).unwrap();
    fs::write(
        &script,
        r#"#!/bin/sh
case "$2" in *broken*) echo "corrupt database" >&2; exit 1;; esac
name=$(basename "$2" .g)
if [ "$3" = title ]; then echo "$name model"; else echo "/$name"; echo "/$name/part$6"; fi
"#,
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script.display().to_string()
}

/// Index with the fake extractor
#[cfg(unix)]
fn index(tmp: &TempDir) -> assert_cmd::assert::Assert {
    let mged = fake_mged(tmp);
    cadventory(tmp)
        .env("CADVENTORY_EXTRACTOR", mged)
        .args(["index", "--every", "1"])
        .assert()
}

// ============================================================================
// CLI Basic Tests
// ============================================================================

#[test]
fn test_help_displays() {
    let tmp = TempDir::new().unwrap();
    cadventory(&tmp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Keeps a metadata store"))
        .stdout(predicate::str::contains("index"))
        .stdout(predicate::str::contains("report"));
}

#[test]
fn test_version_displays() {
    let tmp = TempDir::new().unwrap();
    cadventory(&tmp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cadventory"));
}

#[test]
fn test_completions_bash() {
    let tmp = TempDir::new().unwrap();
    cadventory(&tmp)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cadventory"));
}

// ============================================================================
// Library Tests
// ============================================================================

#[test]
fn test_init_creates_metadata_dir() {
    let tmp = TempDir::new().unwrap();
    cadventory(&tmp)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized CADventory library"));

    assert!(tmp.path().join(".cadventory").is_dir());
    assert!(tmp.path().join(".cadventory/config.yaml").is_file());
    assert!(tmp.path().join(".cadventory/metadata.db").is_file());
}

#[test]
fn test_init_twice_reports_existing() {
    let tmp = TempDir::new().unwrap();
    cadventory(&tmp).arg("init").assert().success();
    cadventory(&tmp)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_commands_outside_library_fail() {
    let tmp = TempDir::new().unwrap();
    cadventory(&tmp)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a CADventory library"));
}

#[test]
fn test_library_flag_from_outside() {
    let lib = setup_library();
    let elsewhere = TempDir::new().unwrap();
    cadventory(&elsewhere)
        .arg("--library")
        .arg(lib.path())
        .args(["status", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 0"));
}

#[test]
fn test_config_show_defaults() {
    let tmp = setup_library();
    cadventory(&tmp)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("program: mged"))
        .stdout(predicate::str::contains("max_depth: 2"));
}

// ============================================================================
// Indexing Tests
// ============================================================================

#[test]
fn test_index_with_unavailable_extractor_records_failures() {
    let tmp = setup_library();
    cadventory(&tmp)
        .env("CADVENTORY_EXTRACTOR", "cadventory-no-such-mged")
        .args(["index", "--every", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 failure(s)"));

    // The image needs no extractor
    cadventory(&tmp)
        .args(["list", "-f", "path"])
        .assert()
        .success()
        .stdout("models/m35.png\n");

    cadventory(&tmp)
        .args(["list", "--pending", "-f", "path"])
        .assert()
        .success()
        .stdout("models/broken.g\nmodels/m35.g\nmodels/tank.g\n");
}

#[test]
fn test_index_unreadable_library_root_fails() {
    let tmp = setup_library();
    let lib = tmp.path().to_path_buf();
    let elsewhere = TempDir::new().unwrap();
    // --library pointing at a plain directory is not a library
    cadventory(&elsewhere)
        .arg("--library")
        .arg(lib.join("models"))
        .arg("index")
        .assert()
        .failure();
}

#[cfg(unix)]
#[test]
fn test_index_extracts_and_reports_progress() {
    let tmp = setup_library();
    index(&tmp)
        .success()
        .stdout(predicate::str::contains("Indexing complete"))
        .stdout(predicate::str::contains("Geometry: 3 found, 2 processed"))
        .stdout(predicate::str::contains("Images:   1 found, 1 processed"))
        .stderr(predicate::str::contains("[100%] 4/4"));

    cadventory(&tmp)
        .args(["list", "-f", "path"])
        .assert()
        .success()
        .stdout("models/m35.g\nmodels/m35.png\nmodels/tank.g\n");

    cadventory(&tmp)
        .args(["show", "models/m35.g", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"title\": \"m35 model\""))
        .stdout(predicate::str::contains("/m35/part2"))
        .stdout(predicate::str::contains("\"has_thumbnail\": true"));

    cadventory(&tmp)
        .args(["show", "models/broken.g"])
        .assert()
        .success()
        .stdout(predicate::str::contains("failed"))
        .stdout(predicate::str::contains("corrupt database"));
}

#[cfg(unix)]
#[test]
fn test_second_index_makes_no_extractor_calls() {
    let tmp = setup_library();
    index(&tmp).success();

    let mged = fake_mged(&tmp);
    cadventory(&tmp)
        .env("CADVENTORY_EXTRACTOR", mged)
        .args(["index", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"extraction_calls\": 0"))
        .stdout(predicate::str::contains("\"unchanged\": 4"));
}

#[cfg(unix)]
#[test]
fn test_retry_failed_reprocesses_failures() {
    let tmp = setup_library();
    index(&tmp).success();

    let mged = fake_mged(&tmp);
    cadventory(&tmp)
        .env("CADVENTORY_EXTRACTOR", mged)
        .args(["index", "--retry-failed", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"extraction_calls\": 1"))
        .stdout(predicate::str::contains("\"extraction_failures\": 1"));
}

#[cfg(unix)]
#[test]
fn test_removed_file_is_missing_and_keeps_tags_on_return() {
    let tmp = setup_library();
    index(&tmp).success();
    cadventory(&tmp)
        .args(["tag", "add", "models/tank.g", "armor"])
        .assert()
        .success();

    let tank = tmp.path().join("models/tank.g");
    let contents = fs::read(&tank).unwrap();
    fs::remove_file(&tank).unwrap();
    index(&tmp).success();

    cadventory(&tmp)
        .args(["list", "--missing", "-f", "path"])
        .assert()
        .success()
        .stdout("models/tank.g\n");

    fs::write(&tank, contents).unwrap();
    index(&tmp).success();

    cadventory(&tmp)
        .args(["tag", "list", "models/tank.g"])
        .assert()
        .success()
        .stdout("armor\n");
}

#[cfg(unix)]
#[test]
fn test_index_reset_rebuilds() {
    let tmp = setup_library();
    index(&tmp).success();
    cadventory(&tmp)
        .args(["tag", "add", "models/m35.g", "truck"])
        .assert()
        .success();

    let mged = fake_mged(&tmp);
    cadventory(&tmp)
        .env("CADVENTORY_EXTRACTOR", mged)
        .args(["index", "--reset", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"new\": 4"));

    cadventory(&tmp)
        .args(["tag", "list", "models/m35.g"])
        .assert()
        .success()
        .stdout("");
}

// ============================================================================
// Tag and Search Tests
// ============================================================================

#[cfg(unix)]
#[test]
fn test_tag_add_remove_and_search() {
    let tmp = setup_library();
    index(&tmp).success();

    cadventory(&tmp)
        .args(["tag", "add", "models/m35.g", "truck", "army", "Truck"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added 2 tag(s)"));

    cadventory(&tmp)
        .args(["search", "TRUCK", "--field", "tags", "-f", "path"])
        .assert()
        .success()
        .stdout("models/m35.g\n");

    cadventory(&tmp)
        .args(["search", "tank", "-f", "path"])
        .assert()
        .success()
        .stdout("models/tank.g\n");

    cadventory(&tmp)
        .args(["tag", "list", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tag\": \"army\""));

    cadventory(&tmp)
        .args(["tag", "remove", "models/m35.g", "army"])
        .assert()
        .success();
    cadventory(&tmp)
        .args(["tag", "list", "models/m35.g"])
        .assert()
        .success()
        .stdout("truck\n");
}

#[test]
fn test_tag_generate_without_tagger_fails() {
    let tmp = setup_library();
    cadventory(&tmp)
        .args(["tag", "generate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No tagger configured"));
}

#[cfg(unix)]
#[test]
fn test_tag_generate_with_command_tagger() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = setup_library();
    index(&tmp).success();

    let tagger = tmp.path().join(".xdg/fake-tagger");
    fs::write(&tagger, "#!/bin/sh\necho vehicle\necho '  '\necho military\n").unwrap();
    fs::set_permissions(&tagger, fs::Permissions::from_mode(0o755)).unwrap();

    cadventory(&tmp)
        .env("CADVENTORY_TAGGER", &tagger)
        .args(["tag", "generate", "models/m35.g"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tagged 1 of 1 file(s), 2 new tag(s)"));

    cadventory(&tmp)
        .args(["tag", "list", "models/m35.g"])
        .assert()
        .success()
        .stdout("vehicle\nmilitary\n");
}

// ============================================================================
// Exclusion Tests
// ============================================================================

#[cfg(unix)]
#[test]
fn test_excluded_directory_applies_to_new_files() {
    let tmp = setup_library();
    write(tmp.path(), "archive/old.g", "old geometry");
    cadventory(&tmp)
        .args(["exclude", "archive"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Excluded directory archive/"));

    index(&tmp).success();

    cadventory(&tmp)
        .args(["list", "-f", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("archive").not());
    cadventory(&tmp)
        .args(["list", "--excluded", "-f", "path"])
        .assert()
        .success()
        .stdout("archive/old.g\n");

    cadventory(&tmp)
        .args(["include", "archive"])
        .assert()
        .success();
    index(&tmp).success();
    cadventory(&tmp)
        .args(["list", "-f", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("archive/old.g"));
}

#[cfg(unix)]
#[test]
fn test_exclude_single_file() {
    let tmp = setup_library();
    index(&tmp).success();
    cadventory(&tmp)
        .args(["exclude", "models/tank.g"])
        .assert()
        .success();
    cadventory(&tmp)
        .args(["list", "-f", "path"])
        .assert()
        .success()
        .stdout("models/m35.g\nmodels/m35.png\n");
}

#[test]
fn test_exclude_unknown_path_fails() {
    let tmp = setup_library();
    cadventory(&tmp)
        .args(["exclude", "nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No indexed file or directory"));
}

// ============================================================================
// Selection, Editing and Report Tests
// ============================================================================

#[cfg(unix)]
#[test]
fn test_select_and_report() {
    let tmp = setup_library();
    index(&tmp).success();

    cadventory(&tmp)
        .args(["select", "models/tank.g", "models/m35.g"])
        .assert()
        .success();
    cadventory(&tmp)
        .args(["set", "models/m35.g", "--primary", "/m35/part1", "--author", "A. Smith"])
        .assert()
        .success();

    cadventory(&tmp)
        .args(["report", "--label", "Vehicles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# Model Report"))
        .stdout(predicate::str::contains("**Label:** Vehicles"))
        .stdout(predicate::str::contains("0.png"))
        .stdout(predicate::str::contains("/m35/part1"))
        .stdout(predicate::str::contains("**Models:** 2"));

    let out = tmp.path().join("report.json");
    cadventory(&tmp)
        .args(["report", "--json", "-o"])
        .arg(&out)
        .assert()
        .success();
    let json = fs::read_to_string(&out).unwrap();
    assert!(json.contains("\"image_name\": \"1.png\""));
    assert!(json.contains("\"author\": \"A. Smith\""));

    cadventory(&tmp)
        .args(["deselect", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 2"));
    cadventory(&tmp)
        .args(["list", "--selected", "-f", "path"])
        .assert()
        .success()
        .stdout("");
}

#[cfg(unix)]
#[test]
fn test_cannot_select_failed_file() {
    let tmp = setup_library();
    index(&tmp).success();
    cadventory(&tmp)
        .args(["select", "models/broken.g"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be selected"));
}

#[cfg(unix)]
#[test]
fn test_set_rejects_unknown_primary_object() {
    let tmp = setup_library();
    index(&tmp).success();
    cadventory(&tmp)
        .args(["set", "models/m35.g", "--primary", "/nope"])
        .assert()
        .failure();
    cadventory(&tmp)
        .args(["set", "models/m35.g", "--name", "Deuce"])
        .assert()
        .success();
    cadventory(&tmp)
        .args(["show", "models/m35.g", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"short_name\": \"Deuce\""));
}

#[cfg(unix)]
#[test]
fn test_reset_yes_drops_records() {
    let tmp = setup_library();
    index(&tmp).success();
    cadventory(&tmp)
        .args(["reset", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dropped 4 record(s)"));
    cadventory(&tmp)
        .args(["list", "--all", "-f", "path"])
        .assert()
        .success()
        .stdout("");
}

#[test]
fn test_show_unknown_file_fails() {
    let tmp = setup_library();
    cadventory(&tmp)
        .args(["show", "models/m35.g"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No indexed file"));
}

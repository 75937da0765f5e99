#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use hashcheck::{
    primitives::io::{FileIo, StdFileIo},
    storage::hash::{HashOpaque, HashPageKind, HASH_OPAQUE_LEN},
    types::page::stamp_checksum,
};
use serde_json::Value;
use tempfile::TempDir;

const PAGE_SIZE: usize = 1024;

fn hashcheck() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("hashcheck");
    cmd.env("HASHCHECK_CONFIG", "/nonexistent/hashcheck.toml")
        .env_remove("HASHCHECK_LOG");
    cmd
}

fn setup_index(rows: u64) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("users_email.hidx");
    hashcheck()
        .args(["--page-size", "1024", "create"])
        .arg(&path)
        .args(["--buckets", "4", "--fill-factor", "20"])
        .assert()
        .success();
    if rows > 0 {
        hashcheck()
            .arg("load")
            .arg(&path)
            .args(["--rows", &rows.to_string(), "--seed", "42"])
            .assert()
            .success();
    }
    (dir, path)
}

fn run_json(args: &[&str], path: &Path) -> (i32, Value) {
    let output = hashcheck()
        .args(["--format", "json"])
        .args(args)
        .arg(path)
        .output()
        .expect("run hashcheck");
    let code = output.status.code().expect("exit code");
    let json = serde_json::from_slice(&output.stdout).expect("json output");
    (code, json)
}

/// Rewrites page `page` of the file with `f`, restamping its checksum so the
/// damage is structural rather than a torn write.
fn corrupt_page(path: &Path, page: u64, f: impl FnOnce(&mut [u8])) {
    let io = StdFileIo::open(path).expect("open file");
    let mut data = vec![0u8; PAGE_SIZE];
    let offset = page * PAGE_SIZE as u64;
    io.read_at(offset, &mut data).expect("read page");
    f(&mut data);
    stamp_checksum(&mut data);
    io.write_at(offset, &data).expect("write page");
    io.sync_all().expect("sync");
}

#[test]
fn create_reports_layout_as_json() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("fresh.hidx");
    let (code, json) = run_json(&["--page-size", "1024", "create", "--buckets", "3"], &path);
    assert_eq!(code, 0);
    assert_eq!(json["index"], "fresh");
    assert_eq!(json["buckets"], 4);
    assert_eq!(json["pages"], 5);
    assert_eq!(json["page_size"], 1024);
    assert_eq!(fs::metadata(&path).expect("stat").len(), 5 * PAGE_SIZE as u64);
}

#[test]
fn create_refuses_existing_file() {
    let (_dir, path) = setup_index(0);
    hashcheck()
        .arg("create")
        .arg(&path)
        .assert()
        .failure()
        .code(1);
}

#[test]
fn load_then_check_succeeds() {
    let (_dir, path) = setup_index(2_000);
    let (code, json) = run_json(&["check", "--verify-ownership"], &path);
    assert_eq!(code, 0, "report: {json}");
    assert_eq!(json["success"], true);
    assert_eq!(json["index"], "users_email");
    assert_eq!(json["stats"]["entries_scanned"], 2_000);
    assert!(json["stats"]["max_bucket"].as_u64().expect("max_bucket") >= 4);
    assert!(json["corruption"].is_null());
}

#[test]
fn text_check_prints_summary() {
    let (_dir, path) = setup_index(300);
    let output = hashcheck()
        .args(["--theme", "plain", "check"])
        .arg(&path)
        .output()
        .expect("run hashcheck");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.contains("index users_email is consistent"), "{stdout}");
    assert!(stdout.contains("entries: 300"), "{stdout}");
}

#[test]
fn corrupted_page_type_exits_with_code_two() {
    let (_dir, path) = setup_index(0);
    corrupt_page(&path, 2, |data| {
        let mut opaque = HashOpaque::decode(data).expect("opaque");
        opaque.flags = HashPageKind::Overflow.flag_bits();
        opaque.encode(data).expect("encode");
    });
    let (code, json) = run_json(&["check"], &path);
    assert_eq!(code, 2);
    assert_eq!(json["success"], false);
    assert_eq!(json["corruption"]["kind"], "unexpected_page_type");
    assert_eq!(json["corruption"]["page"], 2);
    assert_eq!(json["corruption"]["expected"], "bucket");
    assert_eq!(json["corruption"]["actual"], "overflow");
}

#[test]
fn torn_page_exits_with_code_two() {
    let (_dir, path) = setup_index(0);
    let io = StdFileIo::open(&path).expect("open file");
    io.write_at(3 * PAGE_SIZE as u64 + 100, &[0xFF; 4]).expect("tear page");
    let (code, json) = run_json(&["check"], &path);
    assert_eq!(code, 2);
    assert!(json["corruption"].is_null());
    let error = json["error"].as_str().expect("error message");
    assert!(error.contains("checksum"), "{error}");
}

#[test]
fn inspect_decodes_metapage_and_bucket_page() {
    let (_dir, path) = setup_index(50);
    let (code, meta) = run_json(&["inspect", "--page", "0"], &path);
    assert_eq!(code, 0);
    assert_eq!(meta["kind"], "meta");
    assert_eq!(meta["meta"]["magic"], 0x0644_0640);
    assert_eq!(meta["meta"]["ntuples"], 50);

    let (code, bucket) = run_json(&["inspect", "--page", "1"], &path);
    assert_eq!(code, 0);
    assert_eq!(bucket["kind"], "bucket");
    assert_eq!(bucket["bucket"], 0);
    assert_eq!(bucket["special"], (PAGE_SIZE - HASH_OPAQUE_LEN) as u64);
    assert!(bucket.get("meta").is_none());
}

#[test]
fn inspect_past_end_fails() {
    let (_dir, path) = setup_index(0);
    hashcheck()
        .arg("inspect")
        .arg(&path)
        .args(["--page", "99"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn profile_supplies_check_options() {
    let (dir, path) = setup_index(100);
    let config = dir.path().join("cli.toml");
    fs::write(
        &config,
        "default_profile = \"strict\"\n\n[profiles.strict]\nstrategy = \"normal\"\nverify_bucket_ownership = true\ncache_pages = 16\n",
    )
    .expect("write config");
    let output = hashcheck()
        .env("HASHCHECK_CONFIG", &config)
        .args(["--format", "json", "check"])
        .arg(&path)
        .output()
        .expect("run hashcheck");
    assert!(output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(json["stats"]["entries_scanned"], 100);
    assert_eq!(json["pool"]["ring_reuses"], 0);

    hashcheck()
        .env("HASHCHECK_CONFIG", &config)
        .args(["--profile", "missing", "check"])
        .arg(&path)
        .assert()
        .failure()
        .code(1);
}

//! CLI behavior tests
//!
//! Each call opens the redb file afresh, the way separate `nanum`
//! invocations do, so state must survive between commands.

use std::path::Path;

use clap::Parser;
use nanum_cli::{Cli, run};
use tempfile::tempdir;

fn nanum(db: &Path, args: &[&str]) -> Result<String, String> {
    let db = db.to_str().unwrap();
    let cli = Cli::try_parse_from(["nanum", "--db", db].into_iter().chain(args.iter().copied())).unwrap();
    let mut out = Vec::new();
    match run(&cli, &mut out) {
        Ok(()) => Ok(String::from_utf8(out).unwrap()),
        Err(e) => Err(e.code().to_string()),
    }
}

#[test]
fn owner_leave_flow_across_invocations() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("nanum.redb");

    assert_eq!(nanum(&db, &["--as", "u2", "ensure", "--room", "post_42", "--owner", "u1"]).unwrap(), "post_42: Created\n");
    assert_eq!(nanum(&db, &["--as", "u2", "ensure", "--room", "post_42", "--owner", "u1"]).unwrap(), "post_42: Unchanged\n");

    nanum(&db, &["--as", "u1", "send", "--room", "post_42", "--text", "Pickup at 6"]).unwrap();
    let read = nanum(&db, &["--as", "u2", "read", "--room", "post_42"]).unwrap();
    assert!(read.contains("Pickup at 6"), "{read}");

    assert_eq!(nanum(&db, &["--as", "u2", "leave", "--room", "post_42", "--owner"]).unwrap_err(), "NOT_OWNER");
    assert_eq!(nanum(&db, &["--as", "u1", "leave", "--room", "post_42", "--owner"]).unwrap(), "post_42: Closed\n");
    assert_eq!(nanum(&db, &["--as", "u2", "send", "--room", "post_42", "--text", "hi"]).unwrap_err(), "ROOM_CLOSED");

    let rooms = nanum(&db, &["--as", "u2", "rooms"]).unwrap();
    assert!(rooms.starts_with("post_42\tChat room\tgroup\tclosed\t"), "{rooms}");
    assert!(nanum(&db, &["--as", "u1", "rooms"]).unwrap().is_empty());
}

#[test]
fn blank_message_is_rejected() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("nanum.redb");
    nanum(&db, &["--as", "u1", "ensure", "--room", "r1"]).unwrap();

    assert_eq!(nanum(&db, &["--as", "u1", "send", "--room", "r1", "--text", "   "]).unwrap_err(), "CONTENT_MISSING");
    assert_eq!(nanum(&db, &["--as", "u1", "send", "--room", "nope", "--text", "hi"]).unwrap_err(), "ROOM_NOT_FOUND");
}

#[test]
fn invalid_room_id_is_rejected() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("nanum.redb");
    assert_eq!(nanum(&db, &["--as", "u1", "ensure", "--room", "a/b"]).unwrap_err(), "INVALID_ROOM_ID");
}

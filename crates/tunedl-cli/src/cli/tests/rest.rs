//! Tests for status, pause, resume, cancel, remove, completions, manpage.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;

#[test]
fn cli_parse_status() {
    match parse(&["tunedl", "status"]) {
        CliCommand::Status { id } => assert!(id.is_none()),
        _ => panic!("expected Status"),
    }
    match parse(&["tunedl", "status", "abc"]) {
        CliCommand::Status { id } => assert_eq!(id.as_deref(), Some("abc")),
        _ => panic!("expected Status with id"),
    }
}

#[test]
fn cli_parse_pause() {
    match parse(&["tunedl", "pause", "abc"]) {
        CliCommand::Pause { id, item } => {
            assert_eq!(id, "abc");
            assert!(item.is_none());
        }
        _ => panic!("expected Pause"),
    }
}

#[test]
fn cli_parse_pause_item() {
    match parse(&["tunedl", "pause", "abc", "--item", "3"]) {
        CliCommand::Pause { id, item } => {
            assert_eq!(id, "abc");
            assert_eq!(item, Some(3));
        }
        _ => panic!("expected Pause with --item"),
    }
}

#[test]
fn cli_parse_resume() {
    match parse(&["tunedl", "resume", "abc", "--item", "2"]) {
        CliCommand::Resume { id, item } => {
            assert_eq!(id, "abc");
            assert_eq!(item, Some(2));
        }
        _ => panic!("expected Resume"),
    }
}

#[test]
fn cli_parse_cancel_and_remove() {
    assert!(matches!(parse(&["tunedl", "cancel", "abc"]), CliCommand::Cancel { id } if id == "abc"));
    assert!(matches!(parse(&["tunedl", "remove", "abc"]), CliCommand::Remove { id } if id == "abc"));
}

#[test]
fn cli_parse_completions() {
    match parse(&["tunedl", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, clap_complete::Shell::Bash),
        _ => panic!("expected Completions"),
    }
    assert!(Cli::try_parse_from(["tunedl", "completions", "tcsh"]).is_err());
}

#[test]
fn cli_parse_manpage() {
    assert!(matches!(parse(&["tunedl", "manpage"]), CliCommand::Manpage));
}

#[test]
fn item_index_must_be_a_number() {
    assert!(Cli::try_parse_from(["tunedl", "pause", "abc", "--item", "x"]).is_err());
}

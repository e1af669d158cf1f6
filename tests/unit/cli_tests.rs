//! Unit tests for CLI argument parsing

use caretab::cli::{CategoryAction, Cli, Commands, OutputFormat, SymptomAction};
use caretab::ImportMode;
use clap::Parser;
use std::path::PathBuf;

#[test]
fn test_init_command_parsing() {
    let cli = Cli::try_parse_from(["caretab", "init"]).unwrap();
    match cli.command {
        Commands::Init { force } => assert!(!force),
        _ => panic!("Expected Init command"),
    }

    let cli = Cli::try_parse_from(["caretab", "init", "--force"]).unwrap();
    match cli.command {
        Commands::Init { force } => assert!(force),
        _ => panic!("Expected Init command"),
    }
}

#[test]
fn test_preview_command_parsing() {
    let cli = Cli::try_parse_from(["caretab", "preview", "records.csv"]).unwrap();
    match cli.command {
        Commands::Preview { file } => assert_eq!(file, PathBuf::from("records.csv")),
        _ => panic!("Expected Preview command"),
    }

    assert!(Cli::try_parse_from(["caretab", "preview"]).is_err());
}

#[test]
fn test_commit_defaults_to_append_without_confirmation() {
    let cli = Cli::try_parse_from(["caretab", "commit", "0123abcd"]).unwrap();
    match cli.command {
        Commands::Commit { token, mode, confirm } => {
            assert_eq!(token, "0123abcd");
            assert_eq!(mode, ImportMode::Append);
            assert!(!confirm);
        }
        _ => panic!("Expected Commit command"),
    }
}

#[test]
fn test_commit_rejects_unknown_mode() {
    assert!(Cli::try_parse_from(["caretab", "commit", "abc", "--mode", "merge"]).is_err());
}

#[test]
fn test_global_flags() {
    let cli = Cli::try_parse_from([
        "caretab",
        "stats",
        "--workspace",
        "/tmp/care",
        "--format",
        "json",
        "--verbose",
    ])
    .unwrap();

    assert!(matches!(cli.command, Commands::Stats));
    assert_eq!(cli.workspace, Some(PathBuf::from("/tmp/care")));
    assert_eq!(cli.format, OutputFormat::Json);
    assert!(cli.verbose);
}

#[test]
fn test_invalid_format_is_rejected() {
    assert!(Cli::try_parse_from(["caretab", "stats", "--format", "yaml"]).is_err());
}

#[test]
fn test_category_subcommands() {
    let cli = Cli::try_parse_from(["caretab", "category", "add", "Nutrition"]).unwrap();
    match cli.command {
        Commands::Category {
            action: CategoryAction::Add { name },
        } => assert_eq!(name, "Nutrition"),
        _ => panic!("Expected category add"),
    }

    let cli = Cli::try_parse_from(["caretab", "category", "rename", "3", "Mobility"]).unwrap();
    match cli.command {
        Commands::Category {
            action: CategoryAction::Rename { id, name },
        } => {
            assert_eq!(id, 3);
            assert_eq!(name, "Mobility");
        }
        _ => panic!("Expected category rename"),
    }

    assert!(Cli::try_parse_from(["caretab", "category", "delete", "three"]).is_err());
}

#[test]
fn test_symptom_list_filters() {
    let cli = Cli::try_parse_from(["caretab", "symptom", "list", "--search", "fat", "--category-id", "2"]).unwrap();
    match cli.command {
        Commands::Symptom {
            action:
                SymptomAction::List {
                    search,
                    category_id,
                    unassigned,
                },
        } => {
            assert_eq!(search.as_deref(), Some("fat"));
            assert_eq!(category_id, Some(2));
            assert!(!unassigned);
        }
        _ => panic!("Expected symptom list"),
    }

    // A category filter and the unassigned filter contradict each other
    assert!(Cli::try_parse_from(["caretab", "symptom", "list", "--category-id", "2", "--unassigned"]).is_err());
}

#[test]
fn test_symptom_assign_without_category_clears_it() {
    let cli = Cli::try_parse_from(["caretab", "symptom", "assign", "Fatigue"]).unwrap();
    match cli.command {
        Commands::Symptom {
            action: SymptomAction::Assign { name, category_id },
        } => {
            assert_eq!(name, "Fatigue");
            assert_eq!(category_id, None);
        }
        _ => panic!("Expected symptom assign"),
    }
}

#[test]
fn test_symptom_rename_takes_two_names() {
    let cli = Cli::try_parse_from(["caretab", "symptom", "rename", "Fatige", "Fatigue"]).unwrap();
    match cli.command {
        Commands::Symptom {
            action: SymptomAction::Rename { old, new },
        } => {
            assert_eq!(old, "Fatige");
            assert_eq!(new, "Fatigue");
        }
        _ => panic!("Expected symptom rename"),
    }

    assert!(Cli::try_parse_from(["caretab", "symptom", "rename", "Fatige"]).is_err());
}

#[test]
fn test_scan_command_parsing() {
    let cli = Cli::try_parse_from(["caretab", "scan"]).unwrap();
    match cli.command {
        Commands::Scan { column, watch, .. } => {
            assert_eq!(column, None);
            assert_eq!(watch, None);
        }
        _ => panic!("Expected Scan command"),
    }

    let cli = Cli::try_parse_from(["caretab", "scan", "--column", "Diagnoses", "--watch", "30"]).unwrap();
    match cli.command {
        Commands::Scan { column, watch, .. } => {
            assert_eq!(column.as_deref(), Some("Diagnoses"));
            assert_eq!(watch, Some(30));
        }
        _ => panic!("Expected Scan command"),
    }

    assert!(Cli::try_parse_from(["caretab", "scan", "--watch", "soon"]).is_err());

    let cli = Cli::try_parse_from(["caretab", "scan", "--watch", "2", "--polls", "5"]).unwrap();
    match cli.command {
        Commands::Scan { watch, polls, .. } => {
            assert_eq!(watch, Some(2));
            assert_eq!(polls, Some(5));
        }
        _ => panic!("Expected Scan command"),
    }

    // --polls only means something while watching
    assert!(Cli::try_parse_from(["caretab", "scan", "--polls", "5"]).is_err());
}

#[test]
fn test_resolve_sources() {
    let cli = Cli::try_parse_from(["caretab", "resolve", "worklist.json"]).unwrap();
    match cli.command {
        Commands::Resolve(args) => {
            assert_eq!(args.file, Some(PathBuf::from("worklist.json")));
            assert_eq!(args.symptom, None);
        }
        _ => panic!("Expected Resolve command"),
    }

    let cli = Cli::try_parse_from(["caretab", "resolve", "--symptom", "Falls", "--category-id", "4"]).unwrap();
    match cli.command {
        Commands::Resolve(args) => {
            assert_eq!(args.symptom.as_deref(), Some("Falls"));
            assert_eq!(args.category_id, Some(4));
        }
        _ => panic!("Expected Resolve command"),
    }

    // A file and a single symptom are alternatives
    assert!(Cli::try_parse_from([
        "caretab",
        "resolve",
        "worklist.json",
        "--symptom",
        "Falls",
        "--category-id",
        "4"
    ])
    .is_err());
}

#[test]
fn test_features_command_parsing() {
    let cli = Cli::try_parse_from(["caretab", "features", "model.txt", "--prefix", "X_"]).unwrap();
    match cli.command {
        Commands::Features { file, prefix } => {
            assert_eq!(file, PathBuf::from("model.txt"));
            assert_eq!(prefix.as_deref(), Some("X_"));
        }
        _ => panic!("Expected Features command"),
    }
}

#[test]
fn test_maintenance_commands() {
    assert!(matches!(Cli::try_parse_from(["caretab", "stats"]).unwrap().command, Commands::Stats));
    assert!(matches!(Cli::try_parse_from(["caretab", "cleanup"]).unwrap().command, Commands::Cleanup { .. }));
}

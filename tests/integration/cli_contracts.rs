use clap::{CommandFactory, Parser};
use filewatch::config::FilewatchConfig;
use filewatch::service::Role;
use filewatch::tooling::cli::{Cli, CliContext, Commands};
use std::fs;

#[test]
fn parse_valid_command_matrix() {
    let cases: Vec<Vec<&str>> = vec![
        vec!["filewatch", "node"],
        vec!["filewatch", "storage"],
        vec!["filewatch", "aggregator"],
        vec!["filewatch", "--config", "fw.toml", "storage"],
        vec!["filewatch", "--log-format", "json", "--log-output", "both", "node"],
        vec!["filewatch", "config"],
        vec!["filewatch", "config", "--node-id", "n1", "--watch-root", "/srv"],
        vec!["filewatch", "config", "-o", "out.toml"],
    ];

    for args in cases {
        let parsed = Cli::try_parse_from(args.clone());
        assert!(parsed.is_ok(), "expected valid parse for args: {args:?}");
    }
}

#[test]
fn parse_rejects_unknown_commands_and_flags() {
    assert!(Cli::try_parse_from(["filewatch"]).is_err());
    assert!(Cli::try_parse_from(["filewatch", "master"]).is_err());
    assert!(Cli::try_parse_from(["filewatch", "node", "--node-id", "n1"]).is_err());
}

#[test]
fn help_lists_every_role() {
    let help = Cli::command().render_long_help().to_string();
    for role in [Role::Node, Role::Storage, Role::Aggregator] {
        assert!(help.contains(role.as_str()), "help missing {role}: {help}");
    }
}

#[test]
fn config_file_and_overrides_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("filewatch.toml");
    fs::write(
        &path,
        "[node]\nnode_id = \"from-file\"\nreconnect_backoff_ms = 250\n\n[logging]\nlevel = \"warn\"\n",
    )
    .unwrap();

    let cli = Cli::try_parse_from([
        "filewatch",
        "--config",
        path.to_str().unwrap(),
        "--log-level",
        "debug",
        "config",
        "--node-id",
        "from-flag",
    ])
    .unwrap();
    let context = CliContext::load(&cli).unwrap();
    assert!(context.config_present);
    assert_eq!(context.config.logging.level, "debug");

    let Commands::Config(args) = &cli.command else {
        panic!("expected config command");
    };
    let mut config = context.config.clone();
    args.apply(&mut config);
    assert_eq!(config.node.node_id.as_deref(), Some("from-flag"));
    assert_eq!(config.node.reconnect_backoff_ms, 250);

    let rendered: FilewatchConfig = toml::from_str(&config.to_toml().unwrap()).unwrap();
    assert_eq!(rendered, config);
}

#[test]
fn malformed_config_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("filewatch.toml");
    fs::write(&path, "[node\nnode_id = ").unwrap();

    let cli = Cli::try_parse_from(["filewatch", "--config", path.to_str().unwrap(), "storage"])
        .unwrap();
    assert!(CliContext::load(&cli).is_err());
}

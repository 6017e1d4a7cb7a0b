//! CLI routing through the library entry point.

use clap::Parser;
use switchboard_cli::{run, Cli, Commands};
use switchboard_core::config::Config;
use tempfile::TempDir;

#[test]
fn test_unknown_command_rejected() {
    assert!(Cli::try_parse_from(["switchboard", "nonexistent-command"]).is_err());
}

#[test]
fn test_serve_is_routed() {
    let cli = Cli::try_parse_from(["switchboard", "serve", "-p", "5151"]).unwrap();
    assert!(matches!(cli.command, Commands::Serve(_)));
}

#[tokio::test]
async fn test_version_runs() {
    let cli = Cli::try_parse_from(["switchboard", "version"]).unwrap();
    run(cli).await.unwrap();
}

#[tokio::test]
async fn test_config_init_set_validate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("switchboard.json5");
    let path_arg = path.to_str().unwrap();

    for args in [
        vec!["switchboard", "--config", path_arg, "config", "init"],
        vec!["switchboard", "--config", path_arg, "config", "set", "server.port", "6061"],
        vec!["switchboard", "--config", path_arg, "config", "validate"],
    ] {
        let cli = Cli::try_parse_from(args).unwrap();
        run(cli).await.unwrap();
    }

    let config = Config::load(&path).unwrap();
    assert_eq!(config.server.port, 6061);

    let cli = Cli::try_parse_from([
        "switchboard",
        "--config",
        path_arg,
        "config",
        "set",
        "server.port",
        "0",
    ])
    .unwrap();
    run(cli).await.unwrap();
    let cli =
        Cli::try_parse_from(["switchboard", "--config", path_arg, "config", "validate"]).unwrap();
    assert!(run(cli).await.is_err());
}

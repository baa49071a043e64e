use std::path::PathBuf;

use alloy_primitives::address;
use buddy_client::{
    config::{BuddyConfig, BuddyEnvArgs, CliEnvExt, ConfigBuilder, ConfigExt},
    evm_client::{EvmEndpoint, NonceManagerKind},
};
use tempfile::TempDir;

type Builder = ConfigBuilder<BuddyConfig, BuddyEnvArgs>;

fn env_name(name: &str) -> String {
    format!("{}_{}", BuddyEnvArgs::ENV_VAR_PREFIX, name)
}

// every env var this file touches, cleared so the host environment can't leak in
fn clean_env() -> Vec<(String, Option<&'static str>)> {
    [
        "HOME",
        "DOTENV",
        "ENDPOINT",
        "CREDENTIAL",
        "HD_INDEX",
        "CONTRACT_ADDRESS",
        "GAS_ESTIMATE_MULTIPLIER",
        "POLL_INTERVAL_MS",
        "NONCE_MANAGER",
        "QUERY_CHUNK_SIZE",
        "LOG_LEVEL",
        "RANDOM_TEST_VALUE",
    ]
    .into_iter()
    .map(|name| (env_name(name), None))
    .collect()
}

fn with_env<R>(vars: &[(&str, &'static str)], f: impl FnOnce() -> R) -> R {
    let mut env = clean_env();
    for (name, value) in vars {
        env.retain(|(existing, _)| *existing != env_name(name));
        env.push((env_name(name), Some(*value)));
    }
    temp_env::with_vars(env, f)
}

fn home_with_config(contents: &str) -> TempDir {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join(BuddyConfig::FILENAME), contents).unwrap();
    home
}

fn args_with_home(home: &TempDir) -> BuddyEnvArgs {
    BuddyEnvArgs {
        home: Some(home.path().to_path_buf()),
        ..Default::default()
    }
}

const CONFIG_FILE: &str = r#"
[default]
endpoint = "ws://127.0.0.1:8546"
query_chunk_size = 100
log_level = ["warn"]

[client]
contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
query_chunk_size = 500
"#;

// confirms the user overrides for the filepath
// the full list of fallbacks depends on the platform and global env vars, so only the first few are checked
#[test]
fn config_filepath() {
    fn filepaths(home: Option<PathBuf>) -> Vec<PathBuf> {
        let builder = Builder::new(BuddyEnvArgs {
            home,
            ..Default::default()
        });
        let cli_env_args = builder.merge_cli_env_args().unwrap();
        Builder::filepaths_to_try(&cli_env_args)
    }

    with_env(&[], || {
        let default_dirs = filepaths(None);
        for i in 1..=10 {
            assert!(!default_dirs
                .contains(&PathBuf::from(format!("/tmp{}", i)).join(Builder::FILENAME)));
        }

        assert_eq!(
            filepaths(Some("/tmp1".into())).first().unwrap(),
            &PathBuf::from("/tmp1").join(Builder::FILENAME)
        );
    });

    // an explicit home still wins over the env var
    with_env(&[("HOME", "/tmp2")], || {
        assert_eq!(
            filepaths(Some("/tmp1".into())).first().unwrap(),
            &PathBuf::from("/tmp1").join(Builder::FILENAME)
        );
    });

    // without one, the env var comes first
    with_env(&[("HOME", "/tmp2")], || {
        assert_eq!(
            filepaths(None).first().unwrap(),
            &PathBuf::from("/tmp2").join(Builder::FILENAME)
        );
    });
}

#[test]
fn config_default() {
    let home = tempfile::tempdir().unwrap();

    let config = with_env(&[], || BuddyConfig::load(args_with_home(&home))).unwrap();
    let default = BuddyConfig::default();

    assert_eq!(config.endpoint, default.endpoint);
    assert_eq!(config.query_chunk_size, 2000);
    assert_eq!(config.log_level, ["info"]);
    assert!(config.credential.is_none());
    assert!(config.contract_address.is_none());
}

#[test]
fn config_file_sections() {
    let home = home_with_config(CONFIG_FILE);

    let config = with_env(&[], || BuddyConfig::load(args_with_home(&home))).unwrap();

    // [default] applies, [client] overrides it
    assert_eq!(config.endpoint, "ws://127.0.0.1:8546");
    assert_eq!(config.log_level, ["warn"]);
    assert_eq!(config.query_chunk_size, 500);
    assert_eq!(
        config.contract_address,
        Some(address!("0x5FbDB2315678afecb367f032d93F642f64180aa3"))
    );
    assert!(matches!(
        config.query_endpoint().unwrap(),
        EvmEndpoint::WebSocket(_)
    ));
}

#[test]
fn config_env_and_args_override_file() {
    let home = home_with_config(CONFIG_FILE);

    let config = with_env(
        &[("QUERY_CHUNK_SIZE", "42"), ("ENDPOINT", "http://localhost:9999")],
        || BuddyConfig::load(args_with_home(&home)),
    )
    .unwrap();

    assert_eq!(config.query_chunk_size, 42);
    assert_eq!(config.endpoint, "http://localhost:9999");

    // args beat env
    let config = with_env(&[("QUERY_CHUNK_SIZE", "42")], || {
        BuddyConfig::load(BuddyEnvArgs {
            query_chunk_size: Some(7),
            ..args_with_home(&home)
        })
    })
    .unwrap();

    assert_eq!(config.query_chunk_size, 7);
}

#[test]
fn config_array_string() {
    let home = home_with_config(CONFIG_FILE);

    let config = with_env(
        &[("LOG_LEVEL", "info, buddy_client=debug, just_to_confirm_test=debug")],
        || BuddyConfig::load(args_with_home(&home)),
    )
    .unwrap();

    assert_eq!(
        config.log_level,
        ["info", "buddy_client=debug", "just_to_confirm_test=debug"]
    );

    let expected = with_env(&[], || {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("info".parse().unwrap())
            .add_directive("buddy_client=debug".parse().unwrap())
            .add_directive("just_to_confirm_test=debug".parse().unwrap())
            .to_string()
    });
    let actual = with_env(&[], || config.tracing_env_filter().unwrap().to_string());
    assert_eq!(actual, expected);

    let config = with_env(&[], || {
        BuddyConfig::load(BuddyEnvArgs {
            log_level: vec!["buddy_client=notalevel".to_string()],
            ..args_with_home(&home)
        })
    })
    .unwrap();
    assert!(config.tracing_env_filter().is_err());
}

#[test]
fn config_signing_client() {
    let home = home_with_config(CONFIG_FILE);

    let config = with_env(&[], || BuddyConfig::load(args_with_home(&home))).unwrap();
    assert!(config.signing_client_config().is_err());
    assert!(config.nonce_manager.is_none());

    let config = with_env(
        &[
            (
                "CREDENTIAL",
                "test test test test test test test test test test test junk",
            ),
            ("HD_INDEX", "1"),
            ("GAS_ESTIMATE_MULTIPLIER", "1.5"),
            ("POLL_INTERVAL_MS", "250"),
            ("NONCE_MANAGER", "simple"),
        ],
        || BuddyConfig::load(args_with_home(&home)),
    )
    .unwrap();

    let signing = config.signing_client_config().unwrap();
    assert_eq!(signing.hd_index, Some(1));
    assert_eq!(signing.gas_estimate_multiplier, Some(1.5));
    assert_eq!(
        signing.poll_interval,
        Some(std::time::Duration::from_millis(250))
    );
    assert_eq!(signing.nonce_manager, NonceManagerKind::Simple);
    assert!(!signing.credential.is_private_key());
    assert!(matches!(signing.endpoint, EvmEndpoint::WebSocket(_)));
}

#[test]
fn config_dotenv() {
    let home = tempfile::tempdir().unwrap();
    let dotenv = home.path().join("testdotenv");
    std::fs::write(
        &dotenv,
        format!("{}=\"hello world\"\n", env_name("RANDOM_TEST_VALUE")),
    )
    .unwrap();

    // the dotenv var is set inside the scope and cleared again when it ends
    let value = with_env(&[], || {
        BuddyConfig::load(BuddyEnvArgs {
            dotenv: Some(dotenv.clone()),
            ..args_with_home(&home)
        })
        .unwrap();

        BuddyEnvArgs::env_var("RANDOM_TEST_VALUE")
    });

    assert_eq!(value.as_deref(), Some("hello world"));
}

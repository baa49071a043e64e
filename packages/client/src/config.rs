use anyhow::{bail, Context, Result};
use clap::Parser;
use figment::{providers::Format, Figment};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{marker::PhantomData, path::PathBuf, time::Duration};

use alloy_primitives::Address;
use alloy_provider::Provider;
use buddy_types::Credential;

use crate::{
    buddy_deployer::{query::DEFAULT_QUERY_CHUNK_SIZE, BuddyDeployerClient, SignerOrProvider},
    evm_client::{EvmEndpoint, EvmQueryClient, EvmSigningClient, EvmSigningClientConfig, NonceManagerKind},
    serde::deserialize_vec_string,
};

/// The builder we use to build Config
#[derive(Debug)]
pub struct ConfigBuilder<CONFIG, ARG> {
    pub cli_env_args: ARG,
    _config: PhantomData<CONFIG>,
}

pub trait CliEnvExt: Serialize + DeserializeOwned + Default + std::fmt::Debug {
    // e.g. "BUDDY"
    const ENV_VAR_PREFIX: &'static str;

    // The section identifier in the TOML file, e.g. "client"
    const TOML_IDENTIFIER: &'static str;

    // whether to print debug messages during config loading
    const PRINT_DEBUG_MSGS: bool = false;

    // an optional argument to specify the home directory
    // if not supplied, config will try a series of fallbacks
    fn home_dir(&self) -> Option<PathBuf>;

    // an optional path to a dotenv file, loaded before anything else
    fn dotenv_path(&self) -> Option<PathBuf>;

    fn merge_cli_env_args(&self) -> Result<Self> {
        let env_prefix = format!("{}_", Self::ENV_VAR_PREFIX);

        let _self = Figment::new()
            .merge(figment::providers::Env::prefixed(&env_prefix))
            .merge(figment::providers::Serialized::defaults(self))
            .extract()?;

        Ok(_self)
    }

    fn env_var(name: &str) -> Option<String> {
        std::env::var(format!("{}_{name}", Self::ENV_VAR_PREFIX)).ok()
    }
}

pub trait ConfigExt: Serialize + DeserializeOwned + Default + std::fmt::Debug {
    // e.g. "buddy.toml"
    const FILENAME: &'static str;

    // e.g. "buddy", used for the fallback directories
    const DIRNAME: &'static str;

    fn log_levels(&self) -> impl Iterator<Item = &str>;

    fn tracing_env_filter(&self) -> Result<tracing_subscriber::EnvFilter> {
        let mut filter = tracing_subscriber::EnvFilter::from_default_env();
        for directive in self.log_levels() {
            match directive.parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(err) => bail!("{}: {}", err, directive),
            }
        }

        Ok(filter)
    }
}

impl<CONFIG: ConfigExt, ARG: CliEnvExt> ConfigBuilder<CONFIG, ARG> {
    pub const FILENAME: &'static str = CONFIG::FILENAME;

    pub fn new(cli_env_args: ARG) -> Self {
        Self {
            cli_env_args,
            _config: PhantomData,
        }
    }

    pub fn merge_cli_env_args(&self) -> Result<ARG> {
        self.cli_env_args.merge_cli_env_args()
    }

    pub fn filepaths_to_try(cli_env_args: &ARG) -> Vec<PathBuf> {
        ConfigFilePath::new(
            CONFIG::FILENAME,
            CONFIG::DIRNAME,
            ARG::ENV_VAR_PREFIX,
            cli_env_args.home_dir(),
        )
        .into_possible()
    }

    pub fn build(self) -> Result<CONFIG> {
        // try to load dotenv first, since it may affect env vars for filepaths
        let mut dotenv_paths = Vec::new();

        if let Some(dotenv_path) = self.cli_env_args.dotenv_path() {
            dotenv_paths.push(dotenv_path);
        }

        if let Some(dotenv_path) = ARG::env_var("DOTENV") {
            dotenv_paths.push(PathBuf::from(dotenv_path));
        }

        dotenv_paths.push(std::env::current_dir()?.join(".env"));

        for dotenv_path in dotenv_paths {
            if ARG::PRINT_DEBUG_MSGS {
                eprintln!("Loading env vars from {}", dotenv_path.display());
            }
            if dotenv_path.exists() {
                if let Err(e) = dotenvy::from_path(dotenv_path) {
                    bail!("Error loading dotenv file: {}", e);
                }
            }
        }

        // first merge the cli and env vars
        let cli_env_args = self.merge_cli_env_args()?;

        let mut figment = Figment::new()
            // Start with the default values as the base
            .merge(figment::providers::Serialized::defaults(CONFIG::default()));

        // then the file-based config, which is optional for a client
        match ConfigFilePath::new(
            CONFIG::FILENAME,
            CONFIG::DIRNAME,
            ARG::ENV_VAR_PREFIX,
            cli_env_args.home_dir(),
        )
        .into_path()
        {
            Some(filepath) => {
                if ARG::PRINT_DEBUG_MSGS {
                    eprintln!("Loading config from {}", filepath.display());
                }

                figment = figment
                    // Then add the [default] section from TOML
                    .merge(Figment::from(
                        figment::providers::Toml::file(&filepath).nested(),
                    ))
                    // Then add specific section, overriding globals where needed
                    .merge(
                        Figment::from(figment::providers::Toml::file(&filepath).nested())
                            .select(ARG::TOML_IDENTIFIER),
                    );
            }
            None => {
                if ARG::PRINT_DEBUG_MSGS {
                    eprintln!(
                        "No {} found (homedir: {:?}), using defaults",
                        CONFIG::FILENAME,
                        cli_env_args.home_dir()
                    );
                }
            }
        }

        // Finally override with cli/env args, as globals so they win over the selected section
        let config: CONFIG = figment
            .merge(figment::providers::Serialized::globals(cli_env_args))
            .extract()
            .context(format!("Error extracting {} config", CONFIG::FILENAME))?;

        Ok(config)
    }
}

// a helper to try a series of fallback paths, looking for a config file
#[derive(Clone, Debug)]
pub struct ConfigFilePath {
    // the filename to look for in each directory, e.g. "buddy.toml"
    pub filename: String,
    // the directory name used for the fallbacks, e.g. "buddy"
    pub dirname: String,
    // the env var prefix, so {PREFIX}_HOME is checked as well
    pub env_prefix: String,
    // the optional directory set via direct args or env
    pub arg_env_dir: Option<PathBuf>,
}

impl ConfigFilePath {
    pub fn new(
        filename: impl ToString,
        dirname: impl ToString,
        env_prefix: impl ToString,
        arg_env_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            filename: filename.to_string(),
            dirname: dirname.to_string(),
            env_prefix: env_prefix.to_string(),
            arg_env_dir,
        }
    }

    pub fn into_path(self) -> Option<PathBuf> {
        self.into_possible().into_iter().find(|path| path.exists())
    }

    // tries a series of fallbacks
    pub fn into_possible(self) -> Vec<PathBuf> {
        let Self {
            filename,
            dirname,
            env_prefix,
            arg_env_dir,
        } = self;

        // the paths returned will be tried in order of pushing
        let mut dirs = Vec::new();

        // explicit, e.g. a `home` arg, or env var {ENV_PREFIX}_HOME="/foo"
        // i.e. the path in this case will be /foo/{filename}
        if let Some(dir) = arg_env_dir {
            dirs.push(expand_tilde(dir));
        }

        // literal env var, e.g. BUDDY_HOME
        if let Ok(dir) = std::env::var(format!("{env_prefix}_HOME")) {
            dirs.push(expand_tilde(dir.into()));
        }

        // next, check the current working directory, wherever the command is run from
        if let Ok(dir) = std::env::current_dir() {
            dirs.push(dir);
        }

        // ~/.buddy/buddy.toml, to not pollute the home directory itself
        if let Some(dir) = dirs::home_dir().map(|dir| dir.join(format!(".{dirname}"))) {
            dirs.push(dir);
        }

        // the system config directory, e.g.
        // Linux: ~/.config/buddy/buddy.toml
        // macOS: ~/Library/Application Support/buddy/buddy.toml
        if let Some(dir) = dirs::config_dir().map(|dir| dir.join(&dirname)) {
            dirs.push(dir);
        }

        // may duplicate config_dir on linux, but not on macOS or windows
        if let Some(dir) = std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .map(|dir| dir.join(&dirname))
        {
            dirs.push(dir);
        }

        if let Some(dir) = dirs::home_dir().map(|dir| dir.join(".config").join(&dirname)) {
            dirs.push(dir);
        }

        // Lastly, try /etc/buddy/buddy.toml
        dirs.push(PathBuf::from("/etc").join(&dirname));

        // now we have a list of directories to check, we need to add the filename to each
        let mut all_files: Vec<PathBuf> = dirs.into_iter().map(|dir| dir.join(&filename)).collect();

        all_files.dedup();

        all_files
    }
}

fn expand_tilde(dir: PathBuf) -> PathBuf {
    shellexpand::tilde(&dir.to_string_lossy())
        .to_string()
        .into()
}

/// This struct is used for both args and environment variables
/// every env var can be overriden by an arg, and these override the config file
/// env vars follow the pattern of BUDDY_{UPPERCASE_ARG_NAME}
#[derive(Debug, Parser, Serialize, Deserialize, Default, Clone)]
#[command(version, about, long_about = None)]
#[serde(default)]
pub struct BuddyEnvArgs {
    /// The directory where buddy.toml is stored
    /// if not provided here or in an env var, a series of default directories will be tried
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,

    /// The path to an optional dotenv file to try and load
    /// if not set, will be the current working directory's .env
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dotenv: Option<PathBuf>,

    /// Node endpoint, http(s) or ws(s)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Mnemonic or 0x private key (usually leave this as None and set it in env)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hd_index: Option<u32>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Address>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_estimate_multiplier: Option<f32>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,

    #[arg(long, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce_manager: Option<NonceManagerKind>,

    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_chunk_size: Option<u64>,

    /// Log level in the format of comma-separated tracing directives.
    #[arg(long, value_delimiter = ',')]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(deserialize_with = "deserialize_vec_string")]
    pub log_level: Vec<String>,
}

impl CliEnvExt for BuddyEnvArgs {
    const ENV_VAR_PREFIX: &'static str = "BUDDY";
    const TOML_IDENTIFIER: &'static str = "client";

    fn home_dir(&self) -> Option<PathBuf> {
        self.home.clone()
    }

    fn dotenv_path(&self) -> Option<PathBuf> {
        self.dotenv.clone()
    }
}

/// The fully merged client config, loaded from (in order of preference):
///
/// 1. args
/// 2. environment variables
/// 3. config file
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BuddyConfig {
    /// Default is `http://127.0.0.1:8545`
    pub endpoint: String,
    /// Without a credential only a read-only client can be built
    pub credential: Option<Credential>,
    pub hd_index: Option<u32>,
    pub contract_address: Option<Address>,
    pub gas_estimate_multiplier: Option<f32>,
    /// How often an http endpoint is polled for new logs
    pub poll_interval_ms: Option<u64>,
    /// `cached` (default) or `simple`
    pub nonce_manager: Option<NonceManagerKind>,
    /// Block span per `eth_getLogs` request
    /// Default is `2000`
    pub query_chunk_size: u64,
    /// The log-level to use, in the format of [tracing directives](https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html#directives).
    /// Default is `["info"]`
    pub log_level: Vec<String>,
}

impl Default for BuddyConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8545".to_string(),
            credential: None,
            hd_index: None,
            contract_address: None,
            gas_estimate_multiplier: None,
            poll_interval_ms: None,
            nonce_manager: None,
            query_chunk_size: DEFAULT_QUERY_CHUNK_SIZE,
            log_level: vec!["info".to_string()],
        }
    }
}

impl ConfigExt for BuddyConfig {
    const FILENAME: &'static str = "buddy.toml";
    const DIRNAME: &'static str = "buddy";

    fn log_levels(&self) -> impl Iterator<Item = &str> {
        self.log_level.iter().map(|s| s.as_str())
    }
}

impl BuddyConfig {
    pub fn load(args: BuddyEnvArgs) -> Result<Self> {
        ConfigBuilder::<Self, BuddyEnvArgs>::new(args).build()
    }

    pub fn query_endpoint(&self) -> Result<EvmEndpoint> {
        Ok(self.endpoint.parse()?)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    pub fn signing_client_config(&self) -> Result<EvmSigningClientConfig> {
        let credential = self
            .credential
            .clone()
            .context("A credential is required for a signing client")?;

        let mut config = EvmSigningClientConfig::new(self.query_endpoint()?, credential);
        if let Some(hd_index) = self.hd_index {
            config = config.with_hd_index(hd_index);
        }
        if let Some(gas_estimate_multiplier) = self.gas_estimate_multiplier {
            config = config.with_gas_estimate_multiplier(gas_estimate_multiplier);
        }
        if let Some(poll_interval) = self.poll_interval() {
            config = config.with_poll_interval(poll_interval);
        }
        if let Some(nonce_manager) = self.nonce_manager {
            config = config.with_nonce_manager(nonce_manager);
        }

        Ok(config)
    }

    pub async fn query_client(&self) -> Result<EvmQueryClient> {
        let client = EvmQueryClient::new(self.query_endpoint()?).await?;
        if let Some(poll_interval) = self.poll_interval() {
            client.provider.client().set_poll_interval(poll_interval);
        }
        Ok(client)
    }

    /// A signing client when a credential is configured, a read-only one otherwise
    pub async fn signer_or_provider(&self) -> Result<SignerOrProvider> {
        Ok(match self.credential {
            Some(_) => EvmSigningClient::new(self.signing_client_config()?)
                .await?
                .into(),
            None => self.query_client().await?.into(),
        })
    }

    pub async fn buddy_deployer(&self) -> Result<BuddyDeployerClient> {
        let address = self
            .contract_address
            .context("No BuddyDeployer contract address configured")?;

        Ok(
            BuddyDeployerClient::new(address, self.signer_or_provider().await?)?
                .with_query_chunk_size(self.query_chunk_size),
        )
    }
}

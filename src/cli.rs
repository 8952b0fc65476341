use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kubectl-watchdog")]
#[command(about = "Print pod and event changes and alert on OOM kills and failed pod kills")]
pub struct Cli {
    /// File holding the bearer token
    #[arg(long, env = "OCLOGS_TOKEN", default_value = "~/token")]
    pub token: String,

    /// API server hostname (port optional)
    #[arg(long, env = "OCLOGS_API")]
    pub api: Option<String>,

    /// Bearer token value; takes precedence over --token
    #[arg(long, env = "OCLOGS_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Namespace to watch (all namespaces when omitted)
    #[arg(short = 'n', long, env = "OCLOGS_NAMESPACE")]
    pub namespace: Option<String>,

    /// Colorize output (default)
    #[arg(long, overrides_with = "no_color")]
    pub color: bool,

    /// Disable colored output
    #[arg(long, overrides_with = "color")]
    pub no_color: bool,

    /// PEM bundle of extra CAs trusted for the API server
    #[arg(long, env = "OCLOGS_CA_STORE")]
    pub ca_store: Option<PathBuf>,

    /// Verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    pub fn color_enabled(&self) -> bool {
        self.color || !self.no_color
    }
}

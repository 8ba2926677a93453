//! sm-acme - drives `sm-acme-core::AcmeManager` against a working directory.
//!
//! The ACME wire client and the splintermail provisioning API client are
//! external collaborators this binary does not implement (see
//! `UnimplementedCollaborator` below); everything else - startup
//! reconciliation, the state machine, persistence, backoff - runs for real.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use rcgen::KeyPair;
use sm_acme_core::{
    AcmeAccount, AcmeCollaborator, AcmeError, AcmeManager, AuthzResult, GetOrderResult, IssuedCert,
    Jwk, NewOrderResult, Result,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sm-acme")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the manager against a working directory until interrupted
    Run {
        /// Directory holding installation.json, account.json, key.pem, cert.pem
        #[arg(long, default_value = ".")]
        working_dir: PathBuf,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("sm-acme {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Run { working_dir } => run(working_dir).await,
    }
}

async fn run(working_dir: PathBuf) -> anyhow::Result<()> {
    let collaborator = Arc::new(UnimplementedCollaborator);
    let (manager, mut update_rx) = AcmeManager::init(working_dir, collaborator).await?;
    let closer = manager.closer();

    tokio::spawn(async move {
        while update_rx.changed().await.is_ok() {
            if update_rx.borrow().is_some() {
                tracing::info!("🔐 certificate updated");
            }
        }
    });

    tokio::select! {
        res = manager.run() => res.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("🛑 ctrl-c received, shutting down");
            closer.notify_one();
            Ok(())
        }
    }
}

/// Real key generation, everything else left for the splintermail
/// provisioning API and ACME wire clients this binary doesn't ship.
struct UnimplementedCollaborator;

fn unimplemented(op: &str) -> AcmeError {
    AcmeError::Protocol(format!(
        "{op} has no collaborator implementation in this binary"
    ))
}

#[async_trait]
impl AcmeCollaborator for UnimplementedCollaborator {
    fn now(&self) -> i64 {
        sm_acme_core::now_unix()
    }

    async fn prepare(&self, _token: &str, _proof: &str) -> Result<()> {
        Err(unimplemented("prepare"))
    }

    async fn unprepare(&self, _token: &str) -> Result<()> {
        Err(unimplemented("unprepare"))
    }

    async fn keygen(&self, path: &std::path::Path) -> Result<KeyPair> {
        let pkey = KeyPair::generate().map_err(|e| AcmeError::ResourceExhausted(e.to_string()))?;
        tokio::fs::write(path, pkey.serialize_pem()).await?;
        Ok(pkey)
    }

    async fn new_account(&self, _key: &Jwk, _email: &str, _key_thumb: Option<&str>) -> Result<AcmeAccount> {
        Err(unimplemented("new_account"))
    }

    async fn new_order(&self, _acct: &AcmeAccount, _domain: &str) -> Result<NewOrderResult> {
        Err(unimplemented("new_order"))
    }

    async fn get_order(&self, _acct: &AcmeAccount, _order: &str) -> Result<GetOrderResult> {
        Err(unimplemented("get_order"))
    }

    async fn list_orders(&self, _acct: &AcmeAccount) -> Result<Vec<String>> {
        Err(unimplemented("list_orders"))
    }

    async fn get_authz(&self, _acct: &AcmeAccount, _authz: &str) -> Result<AuthzResult> {
        Err(unimplemented("get_authz"))
    }

    async fn challenge(&self, _acct: &AcmeAccount, _authz: &str, _challenge: &str) -> Result<()> {
        Err(unimplemented("challenge"))
    }

    async fn challenge_finish(&self, _acct: &AcmeAccount, _authz: &str, _retry_after: i64) -> Result<()> {
        Err(unimplemented("challenge_finish"))
    }

    async fn finalize(
        &self,
        _acct: &AcmeAccount,
        _order: &str,
        _finalize: &str,
        _domain: &str,
        _pkey: &KeyPair,
    ) -> Result<IssuedCert> {
        Err(unimplemented("finalize"))
    }

    async fn finalize_from_processing(
        &self,
        _acct: &AcmeAccount,
        _order: &str,
        _retry_after: i64,
    ) -> Result<IssuedCert> {
        Err(unimplemented("finalize_from_processing"))
    }

    async fn finalize_from_valid(&self, _acct: &AcmeAccount, _certurl: &str) -> Result<IssuedCert> {
        Err(unimplemented("finalize_from_valid"))
    }
}

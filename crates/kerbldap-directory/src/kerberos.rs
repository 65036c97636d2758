//! Kerberos ticket handling for the SASL GSSAPI bind.
//!
//! Tickets are obtained with the system `kinit` into a private file credential cache and
//! destroyed with `kdestroy` once the bind identity is known. The cache location is published
//! through `KRB5CCNAME`, which the in-process GSSAPI library reads, so runs must stay
//! single-threaded while a ticket is held.

use async_trait::async_trait;
use kerbldap_core::{Error, Result};
use std::env;
use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

const CCACHE_VAR: &str = "KRB5CCNAME";
const CONFIG_VAR: &str = "KRB5_CONFIG";

/// Obtains and releases Kerberos tickets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Kerberos: Send + Sync {
    /// Obtains a ticket for `principal`.
    async fn kinit(&self, principal: &str, password: &str) -> Result<()>;

    /// Destroys the ticket obtained by the last [`Kerberos::kinit`].
    async fn kdestroy(&self) -> Result<()>;
}

/// Runs `f` while holding a ticket for `principal`.
///
/// The ticket is destroyed whether `f` succeeds or not; a failing `kdestroy` is only logged
/// so it never masks the outcome of `f`.
///
/// # Errors
///
/// Returns the `kinit` failure, or the error of `f`.
pub async fn with_ticket<T, F>(
    kerberos: &dyn Kerberos,
    principal: &str,
    password: &str,
    f: F,
) -> Result<T>
where
    F: Future<Output = Result<T>> + Send,
{
    kerberos.kinit(principal, password).await?;
    let result = f.await;
    if let Err(err) = kerberos.kdestroy().await {
        warn!(error = %err, "failed to destroy Kerberos ticket");
    }
    result
}

struct TicketCache {
    _dir: TempDir,
    previous_ccache: Option<OsString>,
    previous_config: Option<OsString>,
}

/// [`Kerberos`] backed by the MIT command line tools.
#[derive(Default)]
pub struct KerberosCli {
    krb5_conf: Option<PathBuf>,
    cache: Mutex<Option<TicketCache>>,
}

impl KerberosCli {
    /// Creates the client, optionally pointing the tools at an alternate `krb5.conf`.
    #[must_use]
    pub fn new(krb5_conf: Option<PathBuf>) -> Self {
        Self {
            krb5_conf,
            cache: Mutex::new(None),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<TicketCache>>> {
        self.cache
            .lock()
            .map_err(|_| Error::Internal("Kerberos cache lock poisoned".to_string()))
    }
}

#[async_trait]
impl Kerberos for KerberosCli {
    async fn kinit(&self, principal: &str, password: &str) -> Result<()> {
        let dir = tempfile::Builder::new().prefix("kerbldap-krb5").tempdir()?;
        let ccache = format!("FILE:{}", dir.path().join("ccache").display());
        debug!(principal, ccache, "kinit");

        let cache = TicketCache {
            _dir: dir,
            previous_ccache: env::var_os(CCACHE_VAR),
            previous_config: env::var_os(CONFIG_VAR),
        };
        env::set_var(CCACHE_VAR, &ccache);
        if let Some(conf) = &self.krb5_conf {
            env::set_var(CONFIG_VAR, conf);
        }
        *self.lock()? = Some(cache);

        let result = run_kinit(principal, password).await;
        if result.is_err() {
            restore(self.lock()?.take());
        }
        result
    }

    async fn kdestroy(&self) -> Result<()> {
        if self.lock()?.is_none() {
            return Ok(());
        }
        debug!("kdestroy");
        let output = Command::new("kdestroy")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| external("kdestroy", &err.to_string()));
        restore(self.lock()?.take());

        let output = output?;
        if output.status.success() {
            Ok(())
        } else {
            Err(external(
                "kdestroy",
                String::from_utf8_lossy(&output.stderr).trim(),
            ))
        }
    }
}

async fn run_kinit(principal: &str, password: &str) -> Result<()> {
    let mut child = Command::new("kinit")
        .arg(principal)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| external("kinit", &err.to_string()))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(password.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
    }
    let output = child.wait_with_output().await?;

    if output.status.success() {
        Ok(())
    } else {
        Err(external(
            "kinit",
            String::from_utf8_lossy(&output.stderr).trim(),
        ))
    }
}

fn restore(cache: Option<TicketCache>) {
    let Some(cache) = cache else {
        return;
    };
    match &cache.previous_ccache {
        Some(value) => env::set_var(CCACHE_VAR, value),
        None => env::remove_var(CCACHE_VAR),
    }
    match &cache.previous_config {
        Some(value) => env::set_var(CONFIG_VAR, value),
        None => env::remove_var(CONFIG_VAR),
    }
}

fn external(tool: &str, message: &str) -> Error {
    Error::ExternalTool {
        tool: tool.to_string(),
        message: message.to_string(),
    }
}

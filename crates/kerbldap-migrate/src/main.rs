//! `kerbldap-migrate`: converts a legacy authentication domain into an LDAP profile.

use clap::Parser;
use kerbldap_core::Result;
use kerbldap_directory::Negotiator;
use kerbldap_migrate::store::{connect_options, connect_options_from_url};
use kerbldap_migrate::{
    init_logging, service_account, Cli, EngineConfig, EngineKeyDecryptor, Keytool, Migration,
    MigrationOptions, MigrationReport, PasswordDecryptor, PgAaaStore,
};
use nix::sys::stat::{umask, Mode};
use secrecy::ExposeSecret;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};

fn main() -> ExitCode {
    umask(Mode::from_bits_truncate(0o022));
    let cli = Cli::parse();

    if let Err(err) = init_logging(cli.debug, cli.log.as_deref()) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    info!("tool: {}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let options = match cli.into_options() {
        Ok(options) => options,
        Err(err) => {
            error!("Conversion failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    debug!(?options, "options");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Cannot start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(options)) {
        Ok(report) => {
            info!(
                users = report.users,
                groups = report.groups,
                permissions = report.permissions,
                subscriptions = report.subscriptions,
                "Conversion applied"
            );
            ExitCode::SUCCESS
        }
        Err(err) if err.is_dry_run() => {
            warn!("{err}");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("Conversion failed: {err}");
            debug!("Exception: {err:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(options: MigrationOptions) -> Result<MigrationReport> {
    let engine = EngineConfig::load(options.prefix())?;

    info!("Connecting to database");
    let connect = match &options.database_url {
        Some(url) => connect_options_from_url(url.expose_secret())?,
        None => connect_options(&engine.database()?),
    };
    let store = PgAaaStore::connect(connect).await?;

    // Stored passwords are only decrypted when no override is given.
    let decryptor: Option<Box<dyn PasswordDecryptor>> = match options.bind_password {
        Some(_) => None,
        None => Some(Box::new(EngineKeyDecryptor::from_pkcs12(
            &engine.pki_store(),
            &engine.pki_store_password(),
        )?)),
    };

    let connector = Negotiator::new(options.krb5_conf.clone());
    let mut migration = Migration::new(
        options,
        Box::new(store),
        Box::new(connector),
        decryptor,
        Box::new(Keytool::from_env()),
    )
    .with_owner(service_account()?);
    migration.run().await
}

//! Command handlers.

use std::io::{BufRead, Write};
use std::sync::Arc;

use keyward_kms::{
    InitializationGate, KmsConfig, KmsError, MasterKeyLifecycle, SettingsFile, StoreSettings,
};
use secrecy::SecretString;
use zeroize::Zeroizing;

use super::{Cli, Commands};

/// Run one subcommand. Secrets come from `input`, reports go to `out`.
///
/// # Errors
///
/// Any [`KmsError`] from the underlying operation, or an I/O error while
/// reading stdin or writing the report.
pub fn execute(
    cli: &Cli,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<(), KmsError> {
    let config_dir = cli.config_dir.as_path();
    let config = KmsConfig::load(config_dir);
    config.validate()?;
    let lifecycle = Arc::new(MasterKeyLifecycle::open(config_dir, &config)?);
    let settings = SettingsFile::from_config(config_dir, &config);

    match &cli.command {
        Commands::Status => status(&lifecycle, &settings, out),
        Commands::CreateMasterKey => {
            let password = read_secret_line(input)?;
            lifecycle.create_new_master_key(&password)?;
            writeln!(out, "master key created")?;
            report_backup(&lifecycle, out)
        }
        Commands::Recover => {
            let password = read_secret_line(input)?;
            lifecycle.recover_from_backup(&password)?;
            writeln!(out, "master key recovered")?;
            Ok(())
        }
        Commands::BackupFingerprint => report_backup(&lifecycle, out),
        Commands::ConfigureStore {
            server,
            port,
            database,
            integrated_security,
            user_id,
        } => {
            let master_key = lifecycle.master_key()?;
            let password = if *integrated_security {
                Zeroizing::new(String::new())
            } else {
                read_secret_line(input)?
            };
            let plain = StoreSettings {
                server: server.clone(),
                port: *port,
                database: database.clone(),
                integrated_security: *integrated_security,
                user_id: user_id.clone(),
                password: SecretString::from(password.as_str()),
            };
            settings.save(&plain.encrypt(master_key)?)?;
            writeln!(out, "store settings saved to {}", settings.path().display())?;
            Ok(())
        }
        Commands::Gate => {
            let decision = InitializationGate::new(Arc::clone(&lifecycle), settings).check();
            writeln!(out, "{decision:?} {}", decision.setup_path())?;
            Ok(())
        }
    }
}

fn status(
    lifecycle: &Arc<MasterKeyLifecycle>,
    settings: &SettingsFile,
    out: &mut impl Write,
) -> Result<(), KmsError> {
    let status = lifecycle.status();
    let decision = InitializationGate::new(Arc::clone(lifecycle), settings.clone()).check();
    let report = serde_json::json!({
        "status": status,
        "message": status.message(),
        "masterKeyFile": lifecycle.master_key_path(),
        "backupKeyFile": lifecycle.backup_key_path(),
        "storeConfigured": settings.is_configured(),
        "gate": decision,
        "setupPath": decision.setup_path(),
    });
    let pretty = serde_json::to_string_pretty(&report)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writeln!(out, "{pretty}")?;
    Ok(())
}

fn report_backup(lifecycle: &MasterKeyLifecycle, out: &mut impl Write) -> Result<(), KmsError> {
    let fingerprint = lifecycle.backup_fingerprint()?;
    writeln!(out, "backup file: {}", lifecycle.backup_key_path().display())?;
    writeln!(out, "fingerprint: {fingerprint}")?;
    Ok(())
}

/// First line of `input`, without the line terminator.
fn read_secret_line(input: &mut impl BufRead) -> Result<Zeroizing<String>, KmsError> {
    let mut line = Zeroizing::new(String::new());
    input.read_line(&mut line)?;
    let trimmed_len = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed_len);
    Ok(line)
}

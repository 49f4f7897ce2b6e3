use systemd_journal_logger::{connected_to_journal, JournalLog};

/// Installs the journal logger if the process runs as a systemd unit.
/// Returns whether it was installed.
pub fn init_journal() -> bool {
    if !connected_to_journal() {
        return false;
    }
    let journal = match JournalLog::new() {
        Ok(journal) => journal,
        Err(err) => {
            eprintln!("Could not connect to the journal: {err}");
            return false;
        }
    };
    if let Err(err) = journal
        .add_extra_field("VERSION", env!("CARGO_PKG_VERSION"))
        .install()
    {
        eprintln!("Could not install the journal logger: {err}");
        return false;
    }
    log::set_max_level(log::LevelFilter::Info);
    true
}

/// Resolves at the first SIGTERM or SIGINT.
pub async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sig_term.recv() => {
            log::warn!("received SIGTERM");
        }
        _ = sig_int.recv() => {
            log::warn!("received SIGINT");
        }
    };
    Ok(())
}

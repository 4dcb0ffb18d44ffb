//! The orchestrator: one run of the converter.

use crate::cli::Cli;
use crate::sign::Signer;
use crate::state::State;
use crate::worker::{RunContext, WorkerFatal, update_feeds};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;
use zerofeed_convert::{Package, Sandbox};
use zerofeed_pools::CombinedPool;
use zerofeed_pypi::PypiClient;

/// Exit codes of a run.
const EXIT_OK: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_CANCELLED: u8 = 2;
const EXIT_UNHANDLED: u8 = 3;

/// Configuration of one run.
pub struct RunConfig {
    pub workers: usize,
    pub base_uri: String,
    pub pypi_uri: String,
    pub pypi_mirror: Option<String>,
    pub feeds_dir: PathBuf,
    pub state_file: PathBuf,
    pub signer: Signer,
}

impl RunConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            workers: cli.worker_count(),
            base_uri: cli.base_uri.clone(),
            pypi_uri: cli.pypi_uri.clone(),
            pypi_mirror: cli.pypi_mirror.clone(),
            feeds_dir: cli.feeds_dir.clone(),
            state_file: cli.state_file.clone(),
            signer: Signer::default(),
        }
    }
}

/// Run the converter once and return the process exit code.
pub async fn run(config: &RunConfig) -> u8 {
    // A missing signing key must abort before any work is queued.
    if let Err(error) = config.signer.check().await {
        tracing::error!(
            "Failed to sign a test feed, likely cause: no secret key found.\n{error}"
        );
        return EXIT_ERROR;
    }

    if let Err(error) = std::fs::create_dir_all(&config.feeds_dir) {
        tracing::error!("cannot create {}: {error}", config.feeds_dir.display());
        return EXIT_ERROR;
    }
    let mut state = match State::load(&config.state_file) {
        Ok(state) => state,
        Err(error) => {
            tracing::error!("cannot load state: {error}");
            return EXIT_ERROR;
        }
    };

    let http = match reqwest::Client::builder().user_agent("zerofeed/0.1").build() {
        Ok(http) => http,
        Err(error) => {
            tracing::error!("cannot build HTTP client: {error}");
            return EXIT_ERROR;
        }
    };
    let pool = {
        let client = http.clone();
        let uri = config.pypi_uri.clone();
        Rc::new(CombinedPool::new(move || {
            PypiClient::new(client.clone(), uri.clone())
        }))
    };

    // Consume the changelog.
    {
        let mut pypi = match pool.pypi() {
            Ok(pypi) => pypi,
            Err(error) => {
                tracing::error!("cannot create index client: {error}");
                return EXIT_ERROR;
            }
        };
        if let Err(error) = refresh_changed(&mut state, &mut pypi).await {
            tracing::error!("cannot get changelog from PyPI: {error}");
            return EXIT_ERROR;
        }
    }

    if state.changed.is_empty() {
        tracing::info!("Nothing changed");
        return save_and_exit(&state, config, EXIT_OK);
    }

    let sandbox = match Sandbox::materialize() {
        Ok(sandbox) => Rc::new(sandbox),
        Err(error) => {
            tracing::error!("cannot set up sandbox files: {error}");
            return EXIT_ERROR;
        }
    };
    if let Err(error) = pool.setup().await {
        tracing::error!("cannot set up resource pools: {error}");
        return EXIT_ERROR;
    }

    // Drain the changed set with a fixed set of cooperative workers.
    let queue: VecDeque<String> = state.changed.iter().cloned().collect();
    tracing::debug!("Updating feeds with {} workers", config.workers);
    let state = Rc::new(RefCell::new(state));
    let context = Rc::new(RunContext {
        base_uri: config.base_uri.clone(),
        pypi_mirror: config.pypi_mirror.clone(),
        feeds_dir: config.feeds_dir.clone(),
        pool: Rc::clone(&pool),
        sandbox,
        http,
        signer: config.signer.clone(),
        state: Rc::clone(&state),
        queue: Rc::new(RefCell::new(queue)),
        errored: Rc::new(Cell::new(false)),
    });

    let workers: Vec<_> = (0..config.workers)
        .map(|_| update_feeds(Rc::clone(&context)))
        .collect();
    let outcome = tokio::select! {
        () = wait_for_termination() => {
            tracing::info!("Cancelled, shutting down");
            Outcome::Cancelled
        }
        result = futures::future::try_join_all(workers) => match result {
            Ok(_) => Outcome::Done,
            Err(WorkerFatal::PypiTimeout) => Outcome::PypiTimeout,
        },
    };

    // Dropped worker futures released their leases; straggler processes
    // and mounts go with the pools.
    pool.teardown().await;

    let exit_code = match outcome {
        Outcome::Done if context.errored.get() => {
            tracing::error!("There were errors, programmer required, see exception(s) in log");
            EXIT_UNHANDLED
        }
        Outcome::Done => EXIT_OK,
        Outcome::PypiTimeout => EXIT_ERROR,
        Outcome::Cancelled => EXIT_CANCELLED,
    };
    save_and_exit(&state.borrow(), config, exit_code)
}

enum Outcome {
    Done,
    PypiTimeout,
    Cancelled,
}

/// Persist partial progress on every exit path.
fn save_and_exit(state: &State, config: &RunConfig, exit_code: u8) -> u8 {
    if let Err(error) = state.save(&config.state_file) {
        tracing::error!("cannot save state: {error}");
        return EXIT_ERROR.max(exit_code);
    }
    exit_code
}

/// Update the changed set from the upstream changelog.
///
/// The first run seeds every package from the full index listing; later
/// runs add the names from the changelog delta, creating `Package` entries
/// for names never seen and leaving known ones untouched.
pub async fn refresh_changed(
    state: &mut State,
    pypi: &mut PypiClient,
) -> Result<(), zerofeed_pypi::PypiError> {
    tracing::info!("Getting changelog from PyPI");
    let newest_serial = pypi.changelog_last_serial().await?;
    match state.last_serial {
        None => {
            for name in pypi.list_packages().await? {
                state
                    .packages
                    .entry(name.clone())
                    .or_insert_with(|| Package::new(name.clone()));
                state.changed.insert(name);
            }
        }
        Some(serial) => {
            for entry in pypi.changelog_since_serial(serial).await? {
                let name = entry.name;
                state
                    .packages
                    .entry(name.clone())
                    .or_insert_with(|| Package::new(name.clone()));
                state.changed.insert(name);
            }
        }
    }
    state.last_serial = Some(newest_serial);
    Ok(())
}

async fn wait_for_termination() {
    use tokio::signal::unix::{SignalKind, signal};
    let signals = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::hangup()),
    );
    match signals {
        (Ok(mut term), Ok(mut int), Ok(mut hup)) => {
            tokio::select! {
                _ = term.recv() => {}
                _ = int.recv() => {}
                _ = hup.recv() => {}
            }
        }
        _ => {
            tracing::warn!("cannot install signal handlers; running uninterruptible");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xmlrpc_response(inner: &str) -> String {
        format!(
            "<?xml version='1.0'?><methodResponse><params><param>{inner}</param></params>\
             </methodResponse>"
        )
    }

    fn string_array(items: &[&str]) -> String {
        let values: String = items
            .iter()
            .map(|item| format!("<value><string>{item}</string></value>"))
            .collect();
        xmlrpc_response(&format!(
            "<value><array><data>{values}</data></array></value>"
        ))
    }

    async fn mock_call(server: &mut mockito::ServerGuard, method: &str, body: String) {
        server
            .mock("POST", "/pypi")
            .match_body(mockito::Matcher::Regex(method.to_owned()))
            .with_body(body)
            .create_async()
            .await;
    }

    fn client(server: &mockito::ServerGuard) -> PypiClient {
        PypiClient::new(reqwest::Client::new(), format!("{}/pypi", server.url()))
    }

    #[tokio::test]
    async fn first_run_seeds_every_package() {
        let mut server = mockito::Server::new_async().await;
        mock_call(
            &mut server,
            "changelog_last_serial",
            xmlrpc_response("<value><int>100</int></value>"),
        )
        .await;
        mock_call(&mut server, "list_packages", string_array(&["Foo", "Bar"])).await;

        let mut state = State::default();
        refresh_changed(&mut state, &mut client(&server)).await.unwrap();

        assert_eq!(state.last_serial, Some(100));
        assert_eq!(state.changed.len(), 2);
        assert!(state.packages.contains_key("Foo"));
        assert!(state.packages.contains_key("Bar"));
    }

    #[tokio::test]
    async fn later_runs_add_the_changelog_delta() {
        let mut server = mockito::Server::new_async().await;
        mock_call(
            &mut server,
            "changelog_last_serial",
            xmlrpc_response("<value><int>102</int></value>"),
        )
        .await;
        let entry = |name: &str, serial: i64| {
            format!(
                "<value><array><data>\
                 <value><string>{name}</string></value>\
                 <value><string>1.0</string></value>\
                 <value><int>1500000000</int></value>\
                 <value><string>new release</string></value>\
                 <value><int>{serial}</int></value>\
                 </data></array></value>"
            )
        };
        mock_call(
            &mut server,
            "changelog_since_serial",
            xmlrpc_response(&format!(
                "<value><array><data>{}{}</data></array></value>",
                entry("A", 101),
                entry("B", 102)
            )),
        )
        .await;

        let mut state = State::default();
        state.last_serial = Some(100);
        let mut known = Package::new("A");
        known.blacklisted_versions.insert("bogus".into());
        state.packages.insert("A".into(), known.clone());

        refresh_changed(&mut state, &mut client(&server)).await.unwrap();

        assert_eq!(state.last_serial, Some(102));
        assert_eq!(
            state.changed,
            ["A", "B"].iter().map(|s| (*s).to_owned()).collect()
        );
        // The existing entry, blacklists included, is untouched.
        assert_eq!(state.packages.get("A"), Some(&known));
        assert!(state.packages.contains_key("B"));
    }

    #[tokio::test]
    async fn broken_signer_aborts_with_exit_1() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            workers: 1,
            base_uri: "https://example.org/zf".into(),
            pypi_uri: "http://localhost:1/pypi".into(),
            pypi_mirror: None,
            feeds_dir: dir.path().join("feeds"),
            state_file: dir.path().join("state.json"),
            signer: Signer::with_command(vec!["false".into()]),
        };
        assert_eq!(run(&config).await, EXIT_ERROR);
    }

    #[tokio::test]
    async fn nothing_changed_saves_state_and_exits_zero() {
        let mut server = mockito::Server::new_async().await;
        mock_call(
            &mut server,
            "changelog_last_serial",
            xmlrpc_response("<value><int>100</int></value>"),
        )
        .await;
        mock_call(&mut server, "list_packages", string_array(&[])).await;

        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            workers: 1,
            base_uri: "https://example.org/zf".into(),
            pypi_uri: format!("{}/pypi", server.url()),
            pypi_mirror: None,
            feeds_dir: dir.path().join("feeds"),
            state_file: dir.path().join("state.json"),
            signer: Signer::with_command(vec!["true".into()]),
        };
        assert_eq!(run(&config).await, EXIT_OK);

        let state = State::load(&config.state_file).unwrap();
        assert_eq!(state.last_serial, Some(100));
        assert!(state.changed.is_empty());
    }
}

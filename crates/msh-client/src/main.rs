//! msh binary entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use msh_client::{
    Cli, CommandRouter, InputEvent, InterruptAction, Lifecycle, LineReader, LocalForwarder,
    RemoteCompleter, RemoteForwarder, SessionHandle, SftpTransfer, ShellSession, SshConnection,
    TerminalModeGuard, get_terminal_size, stdout_sink,
};
use msh_core::constants::SESSION_COMMAND_QUEUE;
use msh_core::{ConnectInfo, Forward, ForwardKind, parse_connect};

/// Exit status after Ctrl+C before the shell is up.
const INTERRUPTED_EXIT: i32 = 130;

fn main() {
    let cli = Cli::parse();

    let log_format = cli.log_format.into();
    if let Err(e) = msh_core::init_logging(cli.verbose, cli.log_file.as_deref(), log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "msh starting");

    let target = match parse_connect(&cli.destination, Some(cli.port)) {
        Ok(target) => target,
        Err(e) => {
            error!(error = %e, "Invalid destination");
            eprintln!("msh: {}", e);
            std::process::exit(1);
        }
    };

    let forwards = match cli.forwards() {
        Ok(forwards) => forwards,
        Err(e) => {
            error!(error = %e, "Invalid forward");
            eprintln!("msh: {}", e);
            std::process::exit(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("msh: failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let terminal = TerminalModeGuard::save();
    let code = rt.block_on(run(&cli, target, forwards));
    rt.shutdown_background();
    drop(terminal);

    std::process::exit(code);
}

async fn run(cli: &Cli, target: ConnectInfo, forwards: Vec<Forward>) -> i32 {
    let mut lifecycle = Lifecycle::new();
    let ssh_config = cli.ssh_config();

    eprintln!("msh: Connecting to {}...", target.host);
    let mut connection = tokio::select! {
        result = SshConnection::connect(&target, &ssh_config) => match result {
            Ok(connection) => {
                eprintln!("msh: Connected successfully.");
                connection
            }
            Err(e) => {
                error!(error = %e, fatal = e.is_fatal(), "Connection failed");
                eprintln!("msh: {}", e);
                return 1;
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!(action = ?lifecycle.on_interrupt(), "Interrupted while connecting");
            return INTERRUPTED_EXIT;
        }
    };

    let shell = match connection
        .open_shell(&ssh_config.term, get_terminal_size())
        .await
    {
        Ok(shell) => shell,
        Err(e) => {
            error!(error = %e, "Failed to open shell");
            eprintln!("msh: {}", e);
            let _ = connection.disconnect().await;
            return 1;
        }
    };

    // tcpip-forward needs exclusive access, so remote forwards are
    // requested before the connection is shared.
    let mut remote_relays = Vec::new();
    for forward in forwards.iter().filter(|f| f.kind == ForwardKind::Remote) {
        match connection.request_remote_forward(&forward.spec).await {
            Ok(incoming) => remote_relays.push(RemoteForwarder::new(forward.spec.clone(), incoming)),
            Err(e) => {
                warn!(spec = %forward.spec, error = %e, "Remote forward failed");
                eprintln!("msh: {}", e);
            }
        }
    }

    let connection = Arc::new(connection);
    lifecycle.teardown_mut().set_connection(connection.clone());

    for relay in remote_relays {
        lifecycle.teardown_mut().add_listener(relay.spawn());
    }

    for forward in forwards.iter().filter(|f| f.kind == ForwardKind::Local) {
        match LocalForwarder::bind(forward.spec.clone(), connection.clone()).await {
            Ok(forwarder) => lifecycle.teardown_mut().add_listener(forwarder.spawn()),
            Err(e) => {
                warn!(spec = %forward.spec, error = %e, "Local forward failed");
                eprintln!("msh: local forward {}: {}", forward.spec, e);
            }
        }
    }

    let config = cli.session_config();
    let prompt = config.prompt.clone();
    let (session, handle) = ShellSession::new(config, shell.output, shell.writer, stdout_sink());
    let mut session_task = tokio::spawn(session.run());
    lifecycle.shell_started();

    let (input_tx, mut input_rx) = mpsc::channel(SESSION_COMMAND_QUEUE);
    let reader = match LineReader::spawn(prompt, RemoteCompleter::new(handle.clone()), input_tx) {
        Ok(reader) => reader,
        Err(e) => {
            error!(error = %e, "Failed to start line reader");
            eprintln!("msh: {}", e);
            lifecycle.shell_closed().await;
            return 1;
        }
    };
    lifecycle.teardown_mut().set_reader_closer(reader.closer());

    let local_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let transfer = Arc::new(SftpTransfer::new(connection.clone()));
    let router = CommandRouter::new(handle.clone(), transfer, target.host.clone(), local_dir);

    loop {
        tokio::select! {
            result = &mut session_task => {
                if let Err(e) = result {
                    warn!(error = %e, "Session task failed");
                }
                break;
            }
            event = input_rx.recv() => match event {
                Some(InputEvent::Line(line)) => router.handle(&line).await,
                Some(InputEvent::Interrupt) => {
                    if !interrupt(&lifecycle, &handle).await {
                        break;
                    }
                }
                Some(InputEvent::Eof) => {
                    if let Err(e) = handle.send_eof().await {
                        debug!(error = %e, "Failed to send EOF");
                    }
                }
                None => {
                    info!("Line reader closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                if !interrupt(&lifecycle, &handle).await {
                    break;
                }
            }
        }
    }

    lifecycle.shell_closed().await;
    eprintln!("msh: Connection to {} closed.", target.host);
    debug!(reader_finished = reader.is_finished(), "Session over");
    0
}

/// Apply Ctrl+C. Returns false when the program should exit.
async fn interrupt(lifecycle: &Lifecycle, handle: &SessionHandle) -> bool {
    match lifecycle.on_interrupt() {
        InterruptAction::Forward => {
            if let Err(e) = handle.interrupt().await {
                debug!(error = %e, "Failed to forward interrupt");
            }
            true
        }
        InterruptAction::Exit => false,
    }
}

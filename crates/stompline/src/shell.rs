use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use stompline::client::{
    ClientConfig, CommandDispatcher, CommandOutcome, Connection, Inbound, InboundDispatcher,
    Session, TcpConnection,
};

use crate::exit::{client_error, io_error, CliError, CliResult, INTERNAL, INTERRUPTED, SUCCESS};

/// Run the interactive client until stdin closes.
///
/// The inbound loop runs on its own thread for the whole process; this
/// thread owns the command loop.
pub fn run(config: ClientConfig, fail_fast: bool) -> CliResult<i32> {
    let session = Arc::new(Session::new());
    let connection = Arc::new(TcpConnection::new(
        config.frame.clone(),
        config.connect_timeout,
    ));
    let shutdown = Arc::new(AtomicBool::new(false));

    install_ctrlc_handler(Arc::clone(&shutdown), Arc::clone(&connection))?;
    let inbound = spawn_inbound(
        InboundDispatcher::new(
            Arc::clone(&session),
            Arc::clone(&connection),
            config.gate_poll_interval,
        ),
        Arc::clone(&shutdown),
    )?;

    let commands = CommandDispatcher::new(session, Arc::clone(&connection), config);
    let result = command_loop(&commands, io::stdin().lock(), &shutdown, fail_fast);

    shutdown.store(true, Ordering::SeqCst);
    connection.close();
    inbound
        .join()
        .map_err(|_| CliError::new(INTERNAL, "inbound loop panicked"))?;

    result.map(|()| SUCCESS)
}

fn command_loop<C: Connection>(
    commands: &CommandDispatcher<C>,
    input: impl BufRead,
    shutdown: &AtomicBool,
    fail_fast: bool,
) -> CliResult<()> {
    for line in input.lines() {
        let line = line.map_err(|err| io_error("failed to read command", err))?;
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match commands.handle_line(&line) {
            Ok(CommandOutcome::Nothing) => {}
            Ok(outcome) => println!("{outcome}"),
            Err(err) => {
                eprintln!("{err}");
                if fail_fast {
                    return Err(client_error(&err));
                }
            }
        }
    }
    tracing::debug!("command input closed");
    Ok(())
}

fn spawn_inbound<C: Connection + 'static>(
    dispatcher: InboundDispatcher<C>,
    shutdown: Arc<AtomicBool>,
) -> CliResult<JoinHandle<()>> {
    thread::Builder::new()
        .name("inbound".to_string())
        .spawn(move || {
            dispatcher.run(&shutdown, |outcome| {
                if !shutdown.load(Ordering::SeqCst) {
                    print_inbound(outcome);
                }
            });
        })
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start inbound loop: {err}")))
}

fn print_inbound(outcome: &Inbound) {
    match outcome {
        Inbound::Receipt { .. } => {}
        Inbound::ServerError { .. } | Inbound::ConnectionLost { .. } | Inbound::Dropped { .. } => {
            eprintln!("{outcome}");
        }
        _ => println!("{outcome}"),
    }
}

fn install_ctrlc_handler(
    shutdown: Arc<AtomicBool>,
    connection: Arc<TcpConnection>,
) -> CliResult<()> {
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
        connection.close();
        std::process::exit(INTERRUPTED);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

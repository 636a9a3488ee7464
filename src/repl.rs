use std::io::Write;

use tokio::io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::select;
use tokio::sync::oneshot::{channel, Receiver};
use tracing::warn;

use crate::command::*;
use crate::execute::execute_command;
use crate::hash_storage::HashStorage;

pub async fn run_repl(mut storage: HashStorage) {
    // One stdin reader for the whole session, each prompt races its next line
    // against ctrl-c
    let (sender, mut receiver) = channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("can't listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        let _ = sender.send(());
    });

    let mut reader = BufReader::new(stdin()).lines();

    println!("Welcome to Silly Hash Index!");
    loop {
        if inner_loop(&mut storage, &mut reader, &mut receiver).await {
            break;
        };
    }
    println!("Goodbye!");
}

/// Runs one line of input, returns true when the session should end
pub fn execute_user_input(storage: &mut HashStorage, input: Option<&str>) -> bool {
    let Some(input) = input else {
        return true;
    };
    if input.trim().is_empty() {
        return false;
    }

    match input.parse::<Command>() {
        Err(err) => println!("Error: {}", err),
        Ok(cmd) => {
            let should_quit = cmd == Command::Exit;
            match execute_command(storage, cmd) {
                Ok(output) if output.is_empty() => {}
                Ok(output) => println!("{}", output),
                Err(err) => println!("Error: {}", err),
            }
            return should_quit;
        }
    }
    false
}

async fn inner_loop(
    storage: &mut HashStorage,
    reader: &mut Lines<BufReader<Stdin>>,
    receiver: &mut Receiver<()>,
) -> bool {
    print!("> ");
    let _ = std::io::stdout().flush();

    select! {
        _ = receiver => {
            println!("Received ctrl-c");
            execute_user_input(storage, Some("EXIT"))
        }
        input = reader.next_line() => {
            match input {
                Ok(line) => execute_user_input(storage, line.as_deref()),
                Err(e) => {
                    warn!("failed to read stdin: {}", e);
                    true
                }
            }
        }
    }
}

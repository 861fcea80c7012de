//! Terminal chat loop on top of a [`SocketSession`].

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::{broadcast, mpsc};

use crate::{
    error::ClientError,
    formatter::MessageFormatter,
    input::{InputCommand, parse_input},
    session::{SessionEvent, SocketSession},
    ui::redisplay_prompt,
};

/// Join `room_id` and run the interactive loop until the user quits.
///
/// # Errors
///
/// Returns `ClientError::TerminalConnection` once reconnect attempts are exhausted, or the
/// error of the initial `connect`.
pub async fn run_client(
    session: SocketSession,
    room_id: String,
    auth_token: Option<String>,
) -> Result<(), ClientError> {
    let user_id = session.user().id.clone();
    let mut events = session.subscribe();
    let mut presence_rx = session.presence().subscribe();
    let mut last_presence = presence_rx.borrow_and_update().clone();

    session.connect(&room_id, auth_token.as_deref()).await?;
    println!(
        "\nYou are '{}' in room '{}'. Type messages and press Enter to send.\n\
         /ref PATH:START-END text attaches a code reference, /who lists participants, /quit exits.\n",
        user_id, room_id
    );

    let mut input_rx = spawn_readline(user_id.clone());

    let result = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::StateChanged(state)) => {
                    print!("{}", MessageFormatter::format_state_change(state));
                    redisplay_prompt(&user_id);
                }
                Ok(SessionEvent::Message(message)) => {
                    print!("{}", MessageFormatter::format_chat_message(&message, &user_id));
                    redisplay_prompt(&user_id);
                }
                Ok(SessionEvent::TerminalError(error)) => {
                    print!("{}", MessageFormatter::format_terminal_error(&error));
                    break Err(ClientError::TerminalConnection(error));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Display fell behind, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break Ok(()),
            },
            Ok(()) = presence_rx.changed() => {
                let current = presence_rx.borrow_and_update().clone();
                let diff = last_presence.diff(&current);
                for participant in diff.joined.iter().filter(|p| p.id != user_id) {
                    print!("{}", MessageFormatter::format_participant_joined(participant));
                }
                for participant in diff.left.iter().filter(|p| p.id != user_id) {
                    print!("{}", MessageFormatter::format_participant_left(participant));
                }
                if !diff.is_empty() {
                    redisplay_prompt(&user_id);
                }
                last_presence = current;
            }
            line = input_rx.recv() => {
                let Some(line) = line else {
                    break Ok(());
                };
                match parse_input(&line) {
                    InputCommand::Send(message) => match session.send(message).await {
                        Ok(pending) => {
                            print!("{}", MessageFormatter::format_sent_confirmation(&pending));
                        }
                        Err(e) => println!("could not send: {}", e),
                    },
                    InputCommand::Who => {
                        print!(
                            "{}",
                            MessageFormatter::format_participants(&session.presence().snapshot(), &user_id)
                        );
                    }
                    InputCommand::Quit => break Ok(()),
                    InputCommand::Invalid(reason) => println!("{}", reason),
                }
                redisplay_prompt(&user_id);
            }
        }
    };

    session.disconnect().await;
    result
}

/// Read lines on a blocking thread; rustyline is synchronous.
fn spawn_readline(user_id: String) -> mpsc::UnboundedReceiver<String> {
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        let prompt = format!("{}> ", user_id);

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    input_rx
}

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::client::{ClientEvent, ConnectionStatus, PmClient};
use crate::protocol::PmCommand;
use crate::scene::{SceneEffect, SceneStateMachine};

/// How often the scene state machine drains its inbound queue.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Terminal-based stand-in for the cabinet UI.
///
/// Issues the same scene requests the engine-hosted UI would. Line input
/// runs on its own blocking thread; the async side prints client events as
/// they arrive and ticks the scene state machine periodically, so protocol
/// traffic shows up while the prompt is idle.
pub struct Console {
    /// Shared handle to the process-manager client
    client: PmClient,
    /// The scene state machine, ticked on an interval
    scene: SceneStateMachine,
    /// Lifecycle notifications from the client
    events: UnboundedReceiver<ClientEvent>,
    retry_interval: Duration,
    connect_timeout: Option<Duration>,
    /// Print events, effects and state as JSON lines instead of colored text
    json: bool,
}

impl Console {
    pub fn new(
        client: PmClient,
        scene: SceneStateMachine,
        events: UnboundedReceiver<ClientEvent>,
        retry_interval: Duration,
        connect_timeout: Option<Duration>,
        json: bool,
    ) -> Self {
        Self {
            client,
            scene,
            events,
            retry_interval,
            connect_timeout,
            json,
        }
    }

    /// Print available commands
    fn print_help(&self) {
        println!("\n{}", "Commands:".green().bold());
        println!("{} - start an app", "start <appId>".cyan());
        println!("{} - open the info overlay", "info <appId>".cyan());
        println!("{} - close the info overlay", "close".cyan());
        println!("{} - reload the menu", "menu".cyan());
        println!("{} - show scene state", "state".cyan());
        println!("{} - show connection status", "status".cyan());
        println!("{} - (re)connect to the process manager", "connect".cyan());
        println!("{} - drop the connection", "disconnect".cyan());
        println!("{} - help", "help".cyan());
        println!("{} - clear", "clear".cyan());
        println!("{} - exit", "exit".cyan());
        println!();
    }

    /// Run the console
    pub async fn run(&mut self) -> Result<()> {
        println!("\n{}", "dmicade process-manager console".green().bold());
        self.print_help();

        self.client.connect(self.retry_interval, self.connect_timeout);

        // The cabinet always boots into the menu flow.
        let effects = self.scene.request_menu();
        for effect in &effects {
            self.render_effect(effect);
        }

        let mut editor = DefaultEditor::new()?;
        let history_path = dirs::home_dir()
            .unwrap_or_default()
            .join(".dmic_console_history");

        // Load history if it exists
        if editor.load_history(&history_path).is_err() {
            println!("{}", "No previous history.".yellow());
        }

        // Input runs on its own blocking thread and hands lines over a
        // channel, leaving this task free to print events as they arrive.
        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        let input = tokio::task::spawn_blocking(move || read_lines(editor, history_path, line_tx));

        let mut tick = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let effects = self.scene.tick();
                    for effect in &effects {
                        self.render_effect(effect);
                    }
                }
                event = self.events.recv() => {
                    if let Some(event) = event {
                        self.print_event(&event);
                    }
                }
                line = line_rx.recv() => match line {
                    Some(line) => {
                        if !self.handle_command(&line).await {
                            break;
                        }
                    }
                    // Input thread ended (CTRL-C / CTRL-D).
                    None => break,
                }
            }
        }

        input.await?;
        Ok(())
    }

    /// Process a command entered by the user
    async fn handle_command(&mut self, command: &str) -> bool {
        let parts: Vec<&str> = command.trim().split_whitespace().collect();
        match parts.first().copied() {
            Some("exit") | Some("quit") => {
                println!("{}", "Goodbye!".green());
                return false;
            }
            Some("help") => self.print_help(),
            Some("clear") => print!("\x1B[2J\x1B[1;1H"),
            Some("start") => {
                if parts.len() != 2 {
                    println!("{}", "Usage: start <appId>".red());
                } else {
                    self.handle_start(parts[1]).await;
                }
            }
            Some("info") => {
                if parts.len() != 2 {
                    println!("{}", "Usage: info <appId>".red());
                } else {
                    match self.scene.open_info(parts[1]) {
                        Ok(effects) => effects.iter().for_each(|e| self.render_effect(e)),
                        Err(e) => println!("{} {}", "Error:".red(), e),
                    }
                }
            }
            Some("close") => {
                let effects = self.scene.close_overlay();
                effects.iter().for_each(|e| self.render_effect(e));
            }
            Some("menu") => {
                let effects = self.scene.request_menu();
                effects.iter().for_each(|e| self.render_effect(e));
            }
            Some("state") => self.print_state(),
            Some("status") => {
                println!("{} {:?}", "Connection:".green(), self.client.status());
            }
            Some("connect") => {
                self.client.connect(self.retry_interval, self.connect_timeout);
            }
            Some("disconnect") => self.client.disconnect().await,
            Some(cmd) => println!("{} {}", "Unknown command:".red(), cmd),
            None => {}
        }
        true
    }

    /// Handle an app start request end to end.
    async fn handle_start(&mut self, app_id: &str) {
        if self.client.status() != ConnectionStatus::Connected {
            println!("{}", "Not connected to the process manager.".red());
            return;
        }

        match self.scene.start_app(app_id) {
            Ok(effects) => {
                for effect in effects {
                    if let SceneEffect::SendStart(id) = &effect {
                        match PmCommand::start_app(id.clone()) {
                            Ok(cmd) => {
                                if let Err(e) = self.client.send(&cmd).await {
                                    println!("{} {}", "Send failed:".red(), e);
                                }
                            }
                            Err(e) => println!("{} {}", "Error:".red(), e),
                        }
                    } else {
                        self.render_effect(&effect);
                    }
                }
            }
            Err(e) => println!("{} {}", "Error:".red(), e),
        }
    }

    fn print_state(&self) {
        if self.json {
            let state = serde_json::json!({
                "scene_state": self.scene.state(),
                "last_running_app": self.scene.last_running_app(),
                "last_crash": self.scene.last_crash(),
            });
            println!("{}", state);
            return;
        }

        println!("{} {:?}", "Scene state:".green(), self.scene.state());
        println!(
            "{} {:?}",
            "Last running app:".green(),
            self.scene.last_running_app()
        );
        if let Some(crash) = self.scene.last_crash() {
            println!(
                "{} {:?} at {}",
                "Last crash:".red(),
                crash.app_id,
                crash.occurred_at
            );
        }
    }

    fn print_event(&self, event: &ClientEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => println!("{} {}", "Failed to encode event:".red(), e),
            }
            return;
        }

        match event {
            ClientEvent::Connected => {
                println!(
                    "{} {}",
                    "Connected:".green(),
                    self.client.socket_path().display()
                );
            }
            ClientEvent::Disconnected => {
                println!("{}", "Disconnected from process manager.".yellow());
            }
            ClientEvent::ConnectionTimeout => {
                println!("{}", "Gave up connecting (timeout).".red());
            }
            ClientEvent::MessageSent(msg) => println!("{} {}", "->".cyan(), msg),
            ClientEvent::MessageReceived(event) => println!("{} {:?}", "<-".cyan(), event),
        }
    }

    fn render_effect(&self, effect: &SceneEffect) {
        // Sending is handled where the effect is produced.
        if matches!(effect, SceneEffect::SendStart(_)) {
            return;
        }

        if self.json {
            match serde_json::to_string(effect) {
                Ok(line) => println!("{}", line),
                Err(e) => println!("{} {}", "Failed to encode effect:".red(), e),
            }
            return;
        }

        match effect {
            SceneEffect::ReloadMenu => println!("{}", "[scene] reloading menu".blue()),
            SceneEffect::EnableScroll => {
                println!("{}", "[scene] menu ready, scrolling enabled".blue());
            }
            SceneEffect::ShowOverlay(id) => {
                println!("{} {}", "[scene] info overlay for".blue(), id.cyan());
            }
            SceneEffect::HideOverlay => println!("{}", "[scene] overlay closed".blue()),
            SceneEffect::ShowLoading(id) => {
                println!("{} {}", "[scene] starting".blue(), id.cyan());
            }
            SceneEffect::HideLoading => {
                println!("{}", "[scene] loading indicator hidden".blue());
            }
            SceneEffect::SendStart(_) => {}
            SceneEffect::StartFailed { app_id, reason } => {
                println!(
                    "{} {:?} ({:?})",
                    "[scene] failed to start".red(),
                    app_id,
                    reason
                );
            }
        }
    }
}

/// Blocking readline loop; owns the editor and saves its history on exit.
fn read_lines(mut editor: DefaultEditor, history_path: PathBuf, tx: UnboundedSender<String>) {
    let prompt = "dmic> ".cyan().bold().to_string();
    loop {
        match editor.readline(&prompt) {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                // Stop reading once the console is told to quit, so this
                // thread is not left blocked on one final readline.
                let quitting = matches!(line.trim(), "exit" | "quit");
                if tx.send(line).is_err() || quitting {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C".yellow());
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("{}", "CTRL-D".yellow());
                break;
            }
            Err(err) => {
                println!("{} {:?}", "Error:".red(), err);
                break;
            }
        }
    }

    // Save history
    if let Err(e) = editor.save_history(&history_path) {
        println!("{} {}", "Failed to save history:".red(), e);
    }
}

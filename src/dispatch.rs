//! Action execution for resolved key bindings.

use std::path::Path;

use rhai::Engine;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::KeyBinding;

/// Executes the actions a binding defines. One dispatcher is shared by
/// every deck session; it holds the expression engine and the eval opt-in.
pub struct Dispatcher {
    allow_eval: bool,
    engine: Engine,
}

impl Dispatcher {
    pub fn new(allow_eval: bool) -> Self {
        Self {
            allow_eval,
            engine: Engine::new(),
        }
    }

    /// Run every action `binding` defines, independently. Failures are
    /// logged with the deck serial and key index and never propagate.
    pub async fn dispatch(&self, serial: &str, key: u8, binding: &KeyBinding) {
        if let Some(shell) = &binding.shell {
            self.run_shell(serial, key, shell, binding.cd.as_deref()).await;
        }
        if let Some(expr) = &binding.eval {
            self.run_eval(serial, key, expr);
        }
    }

    async fn run_shell(&self, serial: &str, key: u8, shell: &str, cd: Option<&Path>) {
        let mut command = Command::new("/bin/sh");
        command.arg("-c").arg(shell);
        if let Some(dir) = cd {
            command.current_dir(dir);
        }
        match command.status().await {
            Ok(status) if !status.success() => {
                warn!("Deck {serial} key {key}: command {shell:?} exited with {status}");
            }
            Ok(_) => {}
            Err(e) => warn!("Deck {serial} key {key}: failed to run {shell:?}: {e}"),
        }
    }

    fn run_eval(&self, serial: &str, key: u8, expr: &str) {
        if !self.allow_eval {
            warn!("Deck {serial} key {key}: eval action ignored (allow_eval is off)");
            return;
        }
        match self.engine.eval::<rhai::Dynamic>(expr) {
            Ok(value) => debug!("Deck {serial} key {key}: eval returned {value}"),
            Err(e) => warn!("Deck {serial} key {key}: eval failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn binding(shell: Option<&str>, cd: Option<&str>, eval: Option<&str>) -> KeyBinding {
        KeyBinding {
            line: 1,
            column: 1,
            label: "Test".to_string(),
            shell: shell.map(String::from),
            cd: cd.map(Into::into),
            eval: eval.map(String::from),
        }
    }

    #[tokio::test]
    async fn shell_action_runs_in_the_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(false);
        let spec = binding(Some("touch marker"), dir.path().to_str(), None);

        dispatcher.dispatch("TEST", 0, &spec).await;
        assert!(dir.path().join("marker").is_file());
    }

    #[tokio::test]
    async fn non_zero_exit_is_not_fatal() {
        let dispatcher = Dispatcher::new(false);
        let spec = binding(Some("exit 3"), None, None);

        // Only logs a warning; a later dispatch still works
        dispatcher.dispatch("TEST", 0, &spec).await;

        let dir = tempfile::tempdir().unwrap();
        let spec = binding(Some("touch after"), dir.path().to_str(), None);
        dispatcher.dispatch("TEST", 0, &spec).await;
        assert!(dir.path().join("after").is_file());
    }

    #[tokio::test]
    async fn eval_is_skipped_unless_opted_in() {
        let dispatcher = Dispatcher::new(false);
        // Even a broken expression is fine when eval is off: it is never
        // handed to the engine
        dispatcher
            .dispatch("TEST", 0, &binding(None, None, Some("not valid rhai !!!")))
            .await;
    }

    #[tokio::test]
    async fn eval_runs_when_opted_in() {
        let dispatcher = Dispatcher::new(true);
        // A failing expression must only log, never panic
        dispatcher
            .dispatch("TEST", 0, &binding(None, None, Some("1 + 1")))
            .await;
        dispatcher
            .dispatch("TEST", 0, &binding(None, None, Some("not valid rhai !!!")))
            .await;
    }

    #[tokio::test]
    async fn shell_and_eval_both_execute() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(true);
        let spec = binding(Some("touch both"), dir.path().to_str(), Some("2 * 2"));
        dispatcher.dispatch("TEST", 0, &spec).await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(dir.path().join("both").is_file());
    }
}

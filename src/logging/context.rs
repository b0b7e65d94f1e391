use crate::cli::Command;

/// Execution contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// One-shot commands (`exec`, `state`, `health`) whose result goes to stdout.
    LocalDev,
    /// The long-running bridge server.
    Server,
    /// Commands that drive the child tool server; its chatter belongs in the log file.
    Proxy,
}

impl ExecutionContext {
    /// Returns `true` when console sinks are off unless explicitly configured.
    pub fn quiet_by_default(self) -> bool {
        matches!(self, ExecutionContext::Proxy)
    }
}

/// Derive the active execution context from a parsed CLI command.
pub fn detect_context(command: &Command) -> ExecutionContext {
    match command {
        Command::Serve(_) => ExecutionContext::Server,
        Command::Proxy(_) => ExecutionContext::Proxy,
        Command::Exec(_) | Command::State(_) | Command::Health => ExecutionContext::LocalDev,
    }
}

use slog::Drain;

/// Root logger for a node process: terminal output, async drain, level from
/// configuration. Both binaries call this once and hand out child loggers.
pub fn root_logger(role: &'static str, level: slog::Level) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = drain.filter_level(level).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("role" => role))
}

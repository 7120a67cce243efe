use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::Layer,
    registry::LookupSpan,
};

use crate::logging::config::{LogFormat, LoggingConfig};

/// Слой форматирования для заданного формата и writer.
///
/// Тип формата стирается в `Box<dyn Layer>`, чтобы консольный и файловый
/// вывод собирались одинаково.
pub fn build_layer<S, W>(
    config: &LoggingConfig,
    format: LogFormat,
    writer: W,
    with_ansi: bool,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => Box::new(
            fmt::layer()
                .event_format(fmt::format().json().with_current_span(true))
                .with_writer(writer)
                .with_ansi(false)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids),
        ),
        LogFormat::Pretty => Box::new(
            fmt::layer()
                .event_format(fmt::format().pretty())
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .with_ansi(with_ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids),
        ),
        LogFormat::Compact => Box::new(
            fmt::layer()
                .event_format(fmt::format().compact())
                .with_writer(writer)
                .with_ansi(with_ansi)
                .with_target(config.with_target)
                .with_thread_ids(false),
        ),
    }
}

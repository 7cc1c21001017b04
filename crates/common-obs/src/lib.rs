use std::{fmt, io, sync::Arc};

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use tracing::{field::Visit, span};
use tracing_subscriber::{
    fmt::{self as tsfmt, format::Writer, FmtContext, FormatEvent, FormatFields, MakeWriter},
    layer::{Context, Layer, SubscriberExt},
    registry::LookupSpan,
    EnvFilter, Registry,
};

mod metrics;

pub use metrics::{
    build_info, encode_prometheus as encode_prometheus_metrics, http_requests_total,
    process_uptime_seconds, register_counter, register_gauge, service_name, CounterVec, GaugeVec,
    PROMETHEUS_CONTENT_TYPE,
};

/// Span field that carries the request identifier into every nested log line.
pub const REQUEST_ID_FIELD: &str = "request_id";

#[derive(Debug, thiserror::Error)]
pub enum ObsInitError {
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Initialize observability for a service.
pub struct ObsInit;

impl ObsInit {
    /// Install a global tracing subscriber writing JSON lines to stderr and
    /// register the service with the metrics facade.
    pub fn init(service: &str) -> Result<(), ObsInitError> {
        let subscriber = Self::subscriber_with_writer(service, io::stderr);
        tracing::subscriber::set_global_default(subscriber).map_err(|err| {
            if tracing::dispatcher::has_been_set() {
                ObsInitError::AlreadyInitialized
            } else {
                ObsInitError::Install(err)
            }
        })
    }

    /// Build a tracing subscriber using the provided writer.
    pub fn subscriber_with_writer<W>(service: &str, writer: W) -> impl tracing::Subscriber
    where
        W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
    {
        metrics::init(service);

        let fallback = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(fallback))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let fmt_layer = tsfmt::layer()
            .with_ansi(false)
            .event_format(JsonLineFormat {
                service: Arc::from(service),
            })
            .with_writer(writer);

        Registry::default()
            .with(env_filter)
            .with(RequestIdLayer)
            .with(fmt_layer)
    }
}

/// Build a simple health and info router for services.
pub fn health_router(service: &'static str) -> Router {
    let health_handler =
        get(move || async move { Json(json!({ "status": "ok", "service": service })) });

    let info_handler = {
        let version = env!("CARGO_PKG_VERSION");
        get(move || async move { Json(json!({ "service": service, "version": version })) })
    };

    Router::new()
        .route("/health", health_handler.clone())
        .route("/v1/health", health_handler)
        .route("/info", info_handler.clone())
        .route("/v1/info", info_handler)
}

/// Request identifier captured from a span's `request_id` field.
#[derive(Clone)]
struct RequestId(String);

struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = RequestIdVisitor::default();
        attrs.record(&mut visitor);
        if let (Some(value), Some(span)) = (visitor.0, ctx.span(id)) {
            span.extensions_mut().insert(RequestId(value));
        }
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let mut visitor = RequestIdVisitor::default();
        values.record(&mut visitor);
        if let (Some(value), Some(span)) = (visitor.0, ctx.span(id)) {
            let mut extensions = span.extensions_mut();
            extensions.remove::<RequestId>();
            extensions.insert(RequestId(value));
        }
    }
}

#[derive(Default)]
struct RequestIdVisitor(Option<String>);

impl Visit for RequestIdVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == REQUEST_ID_FIELD {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == REQUEST_ID_FIELD {
            self.0 = Some(format!("{:?}", value).trim_matches('"').to_string());
        }
    }
}

/// One JSON object per event: level, target, service, request id and fields.
struct JsonLineFormat {
    service: Arc<str>,
}

impl<S, N> FormatEvent<S, N> for JsonLineFormat
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let request_id = ctx.lookup_current().and_then(|span| {
            span.scope()
                .find_map(|scope_span| scope_span.extensions().get::<RequestId>().cloned())
        });

        let mut line = Map::new();
        line.insert(
            "level".into(),
            Value::String(metadata.level().as_str().to_ascii_lowercase()),
        );
        line.insert("target".into(), Value::String(metadata.target().into()));
        line.insert("service".into(), Value::String(self.service.to_string()));
        line.insert(
            REQUEST_ID_FIELD.into(),
            request_id.map_or(Value::Null, |id| Value::String(id.0)),
        );
        line.insert("fields".into(), Value::Object(fields.0));

        let encoded = serde_json::to_string(&Value::Object(line)).map_err(|_| fmt::Error)?;
        writeln!(writer, "{encoded}")
    }
}

#[derive(Default)]
struct FieldCollector(Map<String, Value>);

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        self.0
            .insert(field.name().to_string(), Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), json!(value));
    }

    fn record_error(
        &mut self,
        field: &tracing::field::Field,
        value: &(dyn std::error::Error + 'static),
    ) {
        self.0
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }
}

use once_cell::sync::{Lazy, OnceCell};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Mutex, RwLock};
use std::time::Instant;

pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

const BUILD_SHA: &str = match option_env!("BUILD_SHA") {
    Some(value) => value,
    None => "dev",
};
const PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

static SERVICE_NAME: OnceCell<&'static str> = OnceCell::new();
static PROCESS_START: OnceCell<Instant> = OnceCell::new();
static REGISTRY: Lazy<RwLock<Vec<Family>>> = Lazy::new(|| RwLock::new(Vec::new()));

#[derive(Clone, Copy)]
enum Family {
    Counter(&'static CounterVec),
    Gauge(&'static GaugeVec),
}

impl Family {
    fn name(&self) -> &'static str {
        match self {
            Family::Counter(counter) => counter.name,
            Family::Gauge(gauge) => gauge.name,
        }
    }
}

pub(crate) fn init(service: &str) {
    if SERVICE_NAME.get().is_some() {
        return;
    }

    let leaked: &'static str = Box::leak(service.to_string().into_boxed_str());
    SERVICE_NAME.set(leaked).ok();
    PROCESS_START.get_or_init(Instant::now);

    build_info().set(&[leaked, PACKAGE_VERSION, BUILD_SHA], 1.0);
    process_uptime_seconds().set(&[leaked], 0.0);
}

pub fn service_name() -> Option<&'static str> {
    SERVICE_NAME.get().copied()
}

/// Monotonic counter keyed by label values.
pub struct CounterVec {
    name: &'static str,
    help: &'static str,
    label_names: &'static [&'static str],
    values: Mutex<BTreeMap<Vec<String>, u64>>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[&str], amount: u64) {
        let key = self.key(labels);
        let mut values = self.values.lock().expect("lock poisoned");
        *values.entry(key).or_insert(0) += amount;
    }

    pub fn get(&self, labels: &[&str]) -> u64 {
        let key = self.key(labels);
        let values = self.values.lock().expect("lock poisoned");
        values.get(&key).copied().unwrap_or(0)
    }

    fn key(&self, labels: &[&str]) -> Vec<String> {
        debug_assert_eq!(labels.len(), self.label_names.len(), "{}", self.name);
        labels.iter().map(|label| label.to_string()).collect()
    }
}

/// Point-in-time value keyed by label values.
pub struct GaugeVec {
    name: &'static str,
    help: &'static str,
    label_names: &'static [&'static str],
    values: Mutex<BTreeMap<Vec<String>, f64>>,
}

impl GaugeVec {
    pub fn set(&self, labels: &[&str], value: f64) {
        let key = labels.iter().map(|label| label.to_string()).collect();
        self.values
            .lock()
            .expect("lock poisoned")
            .insert(key, value);
    }

    pub fn get(&self, labels: &[&str]) -> Option<f64> {
        let key: Vec<String> = labels.iter().map(|label| label.to_string()).collect();
        self.values.lock().expect("lock poisoned").get(&key).copied()
    }
}

/// Register a counter family; registering the same name twice returns the
/// existing family.
pub fn register_counter(
    name: &'static str,
    help: &'static str,
    label_names: &'static [&'static str],
) -> &'static CounterVec {
    let mut families = REGISTRY.write().expect("lock poisoned");
    for family in families.iter() {
        if let Family::Counter(existing) = family {
            if existing.name == name {
                return *existing;
            }
        }
    }
    let counter: &'static CounterVec = Box::leak(Box::new(CounterVec {
        name,
        help,
        label_names,
        values: Mutex::new(BTreeMap::new()),
    }));
    families.push(Family::Counter(counter));
    counter
}

pub fn register_gauge(
    name: &'static str,
    help: &'static str,
    label_names: &'static [&'static str],
) -> &'static GaugeVec {
    let mut families = REGISTRY.write().expect("lock poisoned");
    for family in families.iter() {
        if let Family::Gauge(existing) = family {
            if existing.name == name {
                return *existing;
            }
        }
    }
    let gauge: &'static GaugeVec = Box::leak(Box::new(GaugeVec {
        name,
        help,
        label_names,
        values: Mutex::new(BTreeMap::new()),
    }));
    families.push(Family::Gauge(gauge));
    gauge
}

pub fn http_requests_total() -> &'static CounterVec {
    static METRIC: OnceCell<&'static CounterVec> = OnceCell::new();
    *METRIC.get_or_init(|| {
        register_counter(
            "http_requests_total",
            "Total HTTP requests handled",
            &["service", "route", "code"],
        )
    })
}

pub fn process_uptime_seconds() -> &'static GaugeVec {
    static METRIC: OnceCell<&'static GaugeVec> = OnceCell::new();
    *METRIC.get_or_init(|| {
        register_gauge(
            "process_uptime_seconds",
            "Service uptime in seconds",
            &["service"],
        )
    })
}

pub fn build_info() -> &'static GaugeVec {
    static METRIC: OnceCell<&'static GaugeVec> = OnceCell::new();
    *METRIC.get_or_init(|| {
        register_gauge(
            "build_info",
            "Build metadata for the running service",
            &["service", "version", "build_sha"],
        )
    })
}

/// Render every registered family in the Prometheus text format.
pub fn encode_prometheus() -> String {
    if let (Some(service), Some(start)) = (service_name(), PROCESS_START.get()) {
        process_uptime_seconds().set(&[service], start.elapsed().as_secs_f64());
    }

    let families: Vec<Family> = REGISTRY.read().expect("lock poisoned").clone();
    let mut output = String::new();
    for family in families {
        match family {
            Family::Counter(counter) => {
                let _ = writeln!(output, "# HELP {} {}", counter.name, counter.help);
                let _ = writeln!(output, "# TYPE {} counter", family.name());
                let values = counter.values.lock().expect("lock poisoned");
                for (labels, value) in values.iter() {
                    write_sample(&mut output, counter.name, counter.label_names, labels);
                    let _ = writeln!(output, " {value}");
                }
            }
            Family::Gauge(gauge) => {
                let _ = writeln!(output, "# HELP {} {}", gauge.name, gauge.help);
                let _ = writeln!(output, "# TYPE {} gauge", family.name());
                let values = gauge.values.lock().expect("lock poisoned");
                for (labels, value) in values.iter() {
                    write_sample(&mut output, gauge.name, gauge.label_names, labels);
                    let _ = writeln!(output, " {value}");
                }
            }
        }
    }
    output
}

fn write_sample(output: &mut String, name: &str, names: &[&str], values: &[String]) {
    output.push_str(name);
    if names.is_empty() {
        return;
    }
    output.push('{');
    for (idx, (label, value)) in names.iter().zip(values).enumerate() {
        if idx > 0 {
            output.push(',');
        }
        let _ = write!(output, "{label}=\"{}\"", escape_label_value(value));
    }
    output.push('}');
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

//! Structured reporting of recoverable protocol problems.
//!
//! The runtime never lets a misbehaving peer crash it. Malformed messages, rejected remote input,
//! desyncs and similar problems are recovered locally and reported here as [`Violation`] values,
//! which a [`ViolationObserver`] can log, count or collect.
//!
//! By default violations go to the [`TracingObserver`]. Tests usually plug in a
//! [`CollectingObserver`] instead:
//!
//! ```
//! use rampart::telemetry::{CollectingObserver, ViolationKind};
//! use std::sync::Arc;
//!
//! let observer = Arc::new(CollectingObserver::new());
//! // ... hand `observer.clone()` to RuntimeBuilder::with_violation_observer and play ...
//! assert!(!observer.has_violation(ViolationKind::Desync));
//! ```

use crate::Tick;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Severity of a violation, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Recovered without any visible effect, e.g. a duplicated patch that was ignored.
    Warning,
    /// Recovered, but something the local player did or saw was discarded.
    Error,
    /// The runtime's own bookkeeping is inconsistent.
    Critical,
}

impl ViolationSeverity {
    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories of violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// A peer sent something the protocol does not allow: a message of the wrong role, a
    /// spoofed sender, an unknown action, a patch that does not apply.
    Protocol,
    /// Predicted and authoritative state diverged; the prediction was discarded.
    Desync,
    /// Remote action input failed schema validation on the host.
    Validation,
    /// Pending-action or baseline bookkeeping is inconsistent.
    StateManagement,
    /// The runtime was configured inconsistently.
    Configuration,
    /// The transport lost a peer or the host.
    Transport,
    /// Internal logic error.
    InternalError,
}

impl ViolationKind {
    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Desync => "desync",
            Self::Validation => "validation",
            Self::StateManagement => "state_management",
            Self::Configuration => "configuration",
            Self::Transport => "transport",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reported problem.
///
/// ```
/// use rampart::telemetry::{Violation, ViolationKind, ViolationSeverity};
/// use rampart::Tick;
///
/// let violation = Violation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::Protocol,
///     "unknown action 'fly'",
///     "game_runtime.rs:1",
/// )
/// .with_tick(Tick(12))
/// .with_context("from", "p2");
///
/// let json = violation.to_json().unwrap();
/// assert!(json.contains(r#""kind":"protocol""#));
/// assert!(json.contains(r#""tick":12"#));
/// ```
#[derive(Debug, Clone, serde::Serialize)]
pub struct Violation {
    /// How bad it is.
    pub severity: ViolationSeverity,
    /// Which part of the protocol it concerns.
    pub kind: ViolationKind,
    /// Human-readable description.
    pub message: String,
    /// Source location where it was detected (file:line).
    pub location: &'static str,
    /// The local tick when it was detected, if any.
    pub tick: Option<Tick>,
    /// Additional structured context, e.g. the offending peer.
    pub context: BTreeMap<String, String>,
}

impl Violation {
    /// Creates a violation without tick or context.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
            tick: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the tick at which this violation occurred.
    #[must_use]
    pub fn with_tick(mut self, tick: Tick) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Adds a context key-value pair.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Serializes this violation to a JSON string.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {} (at {}",
            self.severity, self.kind, self.message, self.location
        )?;
        if let Some(tick) = self.tick {
            write!(f, ", tick={tick}")?;
        }
        if !self.context.is_empty() {
            write!(f, ", context={:?}", self.context)?;
        }
        write!(f, ")")
    }
}

/// Receives every violation a runtime reports.
///
/// ```
/// use rampart::telemetry::{Violation, ViolationObserver};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct Counter(AtomicUsize);
///
/// impl ViolationObserver for Counter {
///     fn on_violation(&self, _violation: &Violation) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait ViolationObserver: Send + Sync {
    /// Called once per violation, synchronously from the runtime operation that detected it.
    fn on_violation(&self, violation: &Violation);
}

/// Logs violations through `tracing`: `Warning` at warn level, `Error` and `Critical` at error.
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

impl TracingObserver {
    /// Creates a new tracing observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &Violation) {
        let severity = violation.severity.as_str();
        let kind = violation.kind.as_str();
        let location = violation.location;
        let tick = violation
            .tick
            .map_or_else(|| "null".to_owned(), |tick| tick.to_string());
        let context = if violation.context.is_empty() {
            "{}".to_owned()
        } else {
            let pairs: Vec<String> = violation
                .context
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        };

        match violation.severity {
            ViolationSeverity::Warning => {
                tracing::warn!(severity, kind, location, tick = %tick, context = %context, "{}", violation.message);
            },
            ViolationSeverity::Error | ViolationSeverity::Critical => {
                tracing::error!(severity, kind, location, tick = %tick, context = %context, "{}", violation.message);
            },
        }
    }
}

/// Stores every violation for later inspection.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<Violation>>,
}

impl CollectingObserver {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all collected violations.
    #[must_use]
    pub fn violations(&self) -> Vec<Violation> {
        self.violations.lock().clone()
    }

    /// Number of collected violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Checks if any violation of `kind` was collected.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.lock().iter().any(|v| v.kind == kind)
    }

    /// All collected violations of `kind`.
    #[must_use]
    pub fn violations_of_kind(&self, kind: ViolationKind) -> Vec<Violation> {
        self.violations
            .lock()
            .iter()
            .filter(|v| v.kind == kind)
            .cloned()
            .collect()
    }

    /// Forgets everything collected so far.
    pub fn clear(&self) {
        self.violations.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &Violation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Forwards violations to several observers in order.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ViolationObserver>>,
}

impl CompositeObserver {
    /// Creates a composite without children.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer.
    pub fn add(&mut self, observer: Arc<dyn ViolationObserver>) {
        self.observers.push(observer);
    }

    /// Creates a composite from a list of observers.
    #[must_use]
    pub fn from_observers(observers: Vec<Arc<dyn ViolationObserver>>) -> Self {
        Self { observers }
    }
}

impl ViolationObserver for CompositeObserver {
    fn on_violation(&self, violation: &Violation) {
        for observer in &self.observers {
            observer.on_violation(violation);
        }
    }
}

impl std::fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("num_observers", &self.observers.len())
            .finish()
    }
}

/// Reports a violation to `observer`, or to [`TracingObserver`] when there is none.
pub fn report_to_observer<O: ViolationObserver + ?Sized>(
    observer: Option<&Arc<O>>,
    violation: &Violation,
) {
    match observer {
        Some(obs) => obs.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Builds a [`Violation`] tagged with the current source location and reports it.
///
/// ```text
/// report_violation!(observer, tick, severity, kind, "message");
/// report_violation!(observer, tick, severity, kind, "message with {}", format_args);
/// ```
///
/// `observer` is an `Option<Arc<dyn ViolationObserver>>` (or a reference to one); `tick` is the
/// local [`Tick`](crate::Tick) at detection time.
///
/// ```
/// use rampart::telemetry::{CollectingObserver, ViolationKind, ViolationObserver, ViolationSeverity};
/// use rampart::{report_violation, Tick};
/// use std::sync::Arc;
///
/// let collector = Arc::new(CollectingObserver::new());
/// let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
/// report_violation!(&observer, Tick(3), ViolationSeverity::Warning, ViolationKind::Protocol,
///     "unexpected {} message", "patch");
/// assert_eq!(collector.len(), 1);
/// ```
#[macro_export]
macro_rules! report_violation {
    ($observer:expr, $tick:expr, $severity:expr, $kind:expr, $msg:literal) => {{
        let violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        )
        .with_tick($tick);
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $tick:expr, $severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        let violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        )
        .with_tick($tick);
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};
}

/// Asserts that a [`CollectingObserver`] holds no violations.
///
/// # Panics
///
/// Panics with the collected violations if there are any.
#[macro_export]
macro_rules! assert_no_violations {
    ($observer:expr) => {{
        let violations = $observer.violations();
        assert!(
            violations.is_empty(),
            "Expected no violations, but found {}:\n{:#?}",
            violations.len(),
            violations
        );
    }};
}

/// Asserts that a [`CollectingObserver`] holds a violation of the given kind.
///
/// # Panics
///
/// Panics with the collected violations if none matches.
#[macro_export]
macro_rules! assert_violation {
    ($observer:expr, $kind:expr) => {{
        assert!(
            $observer.has_violation($kind),
            "Expected violation of kind {:?}, but found: {:#?}",
            $kind,
            $observer.violations()
        );
    }};
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn sample(kind: ViolationKind) -> Violation {
        Violation::new(ViolationSeverity::Warning, kind, "sample", "test.rs:1")
    }

    #[test]
    fn severity_ordering() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn kind_labels() {
        assert_eq!(ViolationKind::Protocol.as_str(), "protocol");
        assert_eq!(ViolationKind::StateManagement.as_str(), "state_management");
        assert_eq!(ViolationKind::InternalError.to_string(), "internal_error");
    }

    #[test]
    fn display_includes_tick_and_context() {
        let violation = Violation::new(
            ViolationSeverity::Error,
            ViolationKind::Desync,
            "prediction discarded",
            "runtime.rs:9",
        )
        .with_tick(Tick(7))
        .with_context("paths", "/players/p1/x");
        let text = violation.to_string();
        assert!(text.starts_with("[error/desync] prediction discarded (at runtime.rs:9"));
        assert!(text.contains("tick=7"));
        assert!(text.contains("/players/p1/x"));
    }

    #[test]
    fn json_has_null_tick_when_unset() {
        let json = sample(ViolationKind::Transport).to_json().unwrap();
        assert!(json.contains(r#""tick":null"#));
        assert!(json.contains(r#""severity":"warning""#));
    }

    #[test]
    fn collecting_observer_filters_by_kind() {
        let observer = CollectingObserver::new();
        observer.on_violation(&sample(ViolationKind::Protocol));
        observer.on_violation(&sample(ViolationKind::Desync));
        observer.on_violation(&sample(ViolationKind::Protocol));
        assert_eq!(observer.len(), 3);
        assert_eq!(observer.violations_of_kind(ViolationKind::Protocol).len(), 2);
        assert!(!observer.has_violation(ViolationKind::Validation));
        observer.clear();
        assert!(observer.is_empty());
    }

    #[test]
    fn composite_forwards_to_all_children() {
        let a = Arc::new(CollectingObserver::new());
        let b = Arc::new(CollectingObserver::new());
        let mut composite = CompositeObserver::new();
        composite.add(a.clone());
        composite.add(b.clone());
        composite.on_violation(&sample(ViolationKind::Configuration));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn macro_reports_location_and_tick() {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
        report_violation!(
            &observer,
            Tick(4),
            ViolationSeverity::Error,
            ViolationKind::Protocol,
            "bad message from {}",
            "p2"
        );
        let violations = collector.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "bad message from p2");
        assert_eq!(violations[0].tick, Some(Tick(4)));
        assert!(violations[0].location.contains("telemetry.rs"));
        crate::assert_violation!(collector, ViolationKind::Protocol);
    }

    #[test]
    fn report_without_observer_falls_back_to_tracing() {
        let observer: Option<Arc<dyn ViolationObserver>> = None;
        report_violation!(
            &observer,
            Tick(0),
            ViolationSeverity::Warning,
            ViolationKind::Transport,
            "host lost"
        );
        let empty = CollectingObserver::new();
        crate::assert_no_violations!(empty);
    }
}

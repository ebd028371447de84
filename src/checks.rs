//! Named pass/fail assertions recorded as `checks` samples.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::client::Response;
use crate::error::{HttpTrailError, Result};
use crate::metrics::{push_if_not_done, Sample, SystemTag, TagsAndMeta};
use crate::state::RunState;

/// Separator between group and check names in a path.
pub const GROUP_SEPARATOR: &str = "::";

/// A named assertion with running pass/fail counts.
#[derive(Debug)]
pub struct Check {
    pub name: String,
    pub path: String,
    passes: AtomicI64,
    fails: AtomicI64,
}

impl Check {
    pub fn passes(&self) -> i64 {
        self.passes.load(Ordering::Relaxed)
    }

    pub fn fails(&self) -> i64 {
        self.fails.load(Ordering::Relaxed)
    }

    fn record(&self, pass: bool) {
        let counter = if pass { &self.passes } else { &self.fails };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Owns the checks declared under one group path.
#[derive(Debug)]
pub struct CheckGroup {
    path: String,
    checks: Mutex<HashMap<String, Arc<Check>>>,
}

impl CheckGroup {
    pub fn root() -> Self {
        Self::named("")
    }

    pub fn named(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            checks: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get or create the check called `name`.
    pub fn check(&self, name: &str) -> Result<Arc<Check>> {
        if name.contains(GROUP_SEPARATOR) {
            return Err(HttpTrailError::InvalidArgument(format!(
                "check name `{name}` may not contain `{GROUP_SEPARATOR}`"
            )));
        }
        let mut checks = self
            .checks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let check = checks.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Check {
                name: name.to_string(),
                path: format!("{}{GROUP_SEPARATOR}{name}", self.path),
                passes: AtomicI64::new(0),
                fails: AtomicI64::new(0),
            })
        });
        Ok(check.clone())
    }

    /// Snapshot of every check, sorted by name.
    pub fn checks(&self) -> Vec<Arc<Check>> {
        let checks = self
            .checks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sorted: BTreeMap<_, _> = checks.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        sorted.into_values().collect()
    }
}

/// Compare `response`'s status with `want` and record a check sample.
///
/// `extra_tags` are applied on top of the run's tags for this sample only.
pub fn check_status(
    state: &RunState,
    want: u16,
    response: &Response,
    extra_tags: &[(&str, &str)],
) -> Result<bool> {
    let mut tags_and_meta: TagsAndMeta = state.tags.clone();
    for (key, value) in extra_tags {
        tags_and_meta.set_tag(*key, *value);
    }

    let check = state.group.check(&format!("check status is {want}"))?;

    if state.system_tags.has(SystemTag::Group) {
        tags_and_meta.set_tag(SystemTag::Group.to_string(), state.group.path());
    }
    if state.system_tags.has(SystemTag::Check) {
        tags_and_meta.set_tag(SystemTag::Check.to_string(), check.name.clone());
    }

    let pass = response.status == want;
    check.record(pass);

    let sample = Sample {
        metric: state.builtin_metrics.checks.clone(),
        tags: Arc::new(tags_and_meta.tags),
        metadata: tags_and_meta.metadata,
        time: Utc::now(),
        value: if pass { 1.0 } else { 0.0 },
    };
    push_if_not_done(state.samples.as_ref(), &sample);

    Ok(pass)
}

use std::fmt;

use tracing::{debug, trace, warn};

use super::{
    error::IndicatorError,
    submode::{Submode, SubmodeExpander},
    types::{DataType, IndicatorResult, Rate, SendReport, SubmodeFailure},
    value::{Value, ValueBag},
};
use crate::core::{context::RunContext, emitter::Emitter};

/// Position of an indicator in its acquisition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Acquiring,
    Acquired,
    Sending,
    Done,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CycleState::Idle => "idle",
            CycleState::Acquiring => "acquiring",
            CycleState::Acquired => "acquired",
            CycleState::Sending => "sending",
            CycleState::Done => "done",
        })
    }
}

/// State and emission policy shared by all indicators.
///
/// Concrete indicators own one `IndicatorCore` and only decide which submodes
/// exist and how each is computed. Value storage, template expansion, zero
/// suppression and key formatting live here.
#[derive(Debug)]
pub struct IndicatorCore {
    name: &'static str,
    rate: Rate,
    key: String,
    datatype: DataType,
    pinned: Option<String>,
    suppress_zeros: bool,
    values: ValueBag,
    expander: SubmodeExpander,
    state: CycleState,
}

impl IndicatorCore {
    pub fn new(name: &'static str, rate: Rate, key: impl Into<String>) -> Self {
        IndicatorCore {
            name,
            rate,
            key: key.into(),
            datatype: DataType::Numeric,
            pinned: None,
            suppress_zeros: false,
            values: ValueBag::new(),
            expander: SubmodeExpander::new(),
            state: CycleState::Idle,
        }
    }

    pub fn with_datatype(mut self, datatype: DataType) -> Self {
        self.datatype = datatype;
        self
    }

    /// Skip emission of values that are exactly zero.
    pub fn suppressing_zeros(mut self, suppress: bool) -> Self {
        self.suppress_zeros = suppress;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn rate(&self) -> Rate {
        self.rate
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    pub fn pinned(&self) -> Option<&str> {
        self.pinned.as_deref()
    }

    pub fn suppresses_zeros(&self) -> bool {
        self.suppress_zeros
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn values(&self) -> &ValueBag {
        &self.values
    }

    pub fn value(&self, submode: &str) -> Option<&Value> {
        self.values.get(submode)
    }

    /// Stores the value of a plain submode.
    pub fn set(&mut self, submode: &Submode, value: impl Into<Value>) {
        self.values.set(submode.radical(), value);
    }

    pub fn expander(&self) -> &SubmodeExpander {
        &self.expander
    }

    /// Entity ids already resolved for `placeholder` in this pass.
    pub fn cached_entities(&self, placeholder: &str) -> Option<Vec<String>> {
        self.expander.cached_entities(placeholder).map(<[String]>::to_vec)
    }

    pub fn remember_entities(&mut self, placeholder: &str, ids: Vec<String>) {
        self.expander.remember_entities(placeholder, ids);
    }

    /// Expands `submode` over `entity_ids` and stores one value per member,
    /// taken from `found` by entity id. Entities without a value get zero.
    pub fn distribute<F>(&mut self, submode: &Submode, entity_ids: &[String], mut found: F)
    where
        F: FnMut(&str) -> Option<Value>,
    {
        let family = self.expander.expand(submode, entity_ids);
        for (id, key) in family.iter() {
            let value = found(id).unwrap_or(Value::Numeric(0.0));
            self.values.set(key, value);
        }
        trace!(
            "{}: {} expanded to {} keys",
            self.name,
            submode,
            family.len()
        );
    }

    /// Stores the empty value under `submode`, or under every member of its
    /// family when the entity set is already known.
    pub fn zero_fill(&mut self, submode: &Submode) {
        let empty = Value::empty_for(self.datatype);
        match submode.placeholder() {
            None => self.values.set(submode.radical(), empty),
            Some(placeholder) => {
                let ids: Vec<String> = match self.expander.family(submode) {
                    Some(family) => family.entity_ids().map(str::to_string).collect(),
                    None => self.cached_entities(placeholder).unwrap_or_default(),
                };
                let family = self.expander.expand(submode, &ids);
                for key in family.keys() {
                    self.values.set(key, empty.clone());
                }
            }
        }
    }

    /// Enters `Acquiring`. A finished cycle restarts from scratch.
    pub fn begin_acquire(&mut self) -> IndicatorResult<()> {
        match self.state {
            CycleState::Acquiring | CycleState::Sending => Err(self.invalid_state("idle or done")),
            _ => {
                self.values.clear();
                self.expander.reset();
                self.state = CycleState::Acquiring;
                Ok(())
            }
        }
    }

    pub fn finish_acquire(&mut self) {
        self.state = CycleState::Acquired;
    }

    /// Leaves an interrupted acquisition. Partial values are dropped.
    pub fn abort_acquire(&mut self) {
        self.values.clear();
        self.expander.reset();
        self.state = CycleState::Idle;
    }

    /// Leaves an interrupted send. Values are kept for another attempt.
    pub fn abort_send(&mut self) {
        self.state = CycleState::Acquired;
    }

    pub fn begin_send(&mut self) -> IndicatorResult<()> {
        if self.state != CycleState::Acquired {
            return Err(self.invalid_state("acquired"));
        }
        self.state = CycleState::Sending;
        Ok(())
    }

    /// Values are consumed by a send; the cycle ends here.
    pub fn finish_send(&mut self) {
        self.values.clear();
        self.expander.reset();
        self.state = CycleState::Done;
    }

    fn invalid_state(&self, expected: &str) -> IndicatorError {
        IndicatorError::InvalidState {
            indicator: self.name.to_string(),
            expected: expected.to_string(),
            actual: self.state.to_string(),
        }
    }

    /// `<key>.<concrete submode>[.<pinned submode>]`
    pub fn metric_key(&self, concrete: &str) -> String {
        match &self.pinned {
            Some(pinned) => format!("{}.{}.{}", self.key, concrete, pinned),
            None => format!("{}.{}", self.key, concrete),
        }
    }

    /// Emits one declared submode, expanding templates into their family.
    ///
    /// # Errors
    ///
    /// `Config` for an empty submode, `InvalidState` before acquisition has
    /// completed. Per-key dispatch failures are reported, not returned.
    pub async fn send_submode(&self, emitter: &Emitter, submode: &str) -> IndicatorResult<SendReport> {
        let submode = Submode::parse(submode)?;
        if !matches!(self.state, CycleState::Acquired | CycleState::Sending) {
            return Err(self.invalid_state("acquired"));
        }

        let mut report = SendReport::default();
        if !submode.is_templated() {
            self.emit(emitter, submode.radical(), &mut report).await;
            return Ok(report);
        }

        match self.expander.family(&submode) {
            Some(family) => {
                for key in family.keys() {
                    self.emit(emitter, key, &mut report).await;
                }
            }
            None => debug!("{}: no family for {}, nothing to send", self.name, submode),
        }
        Ok(report)
    }

    async fn emit(&self, emitter: &Emitter, concrete: &str, report: &mut SendReport) {
        let Some(value) = self.values.get(concrete) else {
            warn!("{}: no value acquired for {}", self.name, concrete);
            report
                .failures
                .push(SubmodeFailure::new(self.name, concrete, "no acquired value"));
            return;
        };

        if self.suppress_zeros && value.is_zero() {
            debug!("{}: zero suppressed for {}", self.name, concrete);
            report.suppressed += 1;
            return;
        }

        let key = self.metric_key(concrete);
        match emitter.emit(&key, self.datatype, value).await {
            Ok(()) => report.sent += 1,
            Err(e) => report
                .failures
                .push(SubmodeFailure::new(self.name, concrete, e)),
        }
    }
}

/// A metric family acquired and emitted on one schedule tier.
///
/// Implementors provide `submodes` and `acquire_submode`; the cycle methods
/// are provided. Calls must not overlap on one instance.
#[async_trait::async_trait]
pub trait Indicator: Send + Sync {
    fn core(&self) -> &IndicatorCore;

    fn core_mut(&mut self) -> &mut IndicatorCore;

    fn name(&self) -> &'static str {
        self.core().name()
    }

    fn rate(&self) -> Rate {
        self.core().rate()
    }

    /// Submodes of this pass. Stable for the whole pass, possibly empty.
    async fn submodes(&mut self, ctx: &RunContext) -> IndicatorResult<Vec<Submode>>;

    /// Computes and stores the value(s) of one submode.
    async fn acquire_submode(&mut self, ctx: &RunContext, submode: &Submode) -> IndicatorResult<()>;

    /// Restricts emission to a single submode, appended to every metric key.
    async fn set_submode(&mut self, ctx: &RunContext, submode: &str) -> IndicatorResult<()> {
        let wanted = Submode::parse(submode)?;
        if !self.submodes(ctx).await?.contains(&wanted) {
            return Err(IndicatorError::Config(format!(
                "Submode '{}' is not available in {}",
                submode,
                self.name()
            )));
        }
        self.core_mut().pinned = Some(wanted.key());
        Ok(())
    }

    /// Problems met while listing submodes that did not prevent the listing.
    /// Drained once per pass and reported with the acquisition failures.
    fn take_discovery_failures(&mut self) -> Vec<SubmodeFailure> {
        Vec::new()
    }

    /// Submodes of this pass, narrowed to the pinned one when set.
    async fn cycle_submodes(&mut self, ctx: &RunContext) -> IndicatorResult<Vec<Submode>> {
        let submodes = self.submodes(ctx).await?;
        Ok(match self.core().pinned().map(str::to_string) {
            Some(pinned) => submodes.into_iter().filter(|s| s.key() == pinned).collect(),
            None => submodes,
        })
    }

    /// Acquires every submode, or only the pinned one. In strict mode the
    /// first failure is returned; otherwise failed submodes are zero-filled
    /// and reported. An error leaves the indicator idle.
    async fn acquire(&mut self, ctx: &RunContext) -> IndicatorResult<Vec<SubmodeFailure>> {
        self.core_mut().begin_acquire()?;
        debug!("Acquiring {}", self.name());

        let submodes = match self.cycle_submodes(ctx).await {
            Ok(submodes) => submodes,
            Err(e) => {
                self.core_mut().abort_acquire();
                return Err(e);
            }
        };
        let mut failures = self.take_discovery_failures();
        for submode in &submodes {
            if let Err(e) = self.acquire_submode(ctx, submode).await {
                if ctx.strict() {
                    self.core_mut().abort_acquire();
                    return Err(e);
                }
                warn!("{}: acquisition of {} failed: {}", self.name(), submode, e);
                self.core_mut().zero_fill(submode);
                failures.push(SubmodeFailure::new(self.name(), &submode.key(), &e));
            }
        }

        self.core_mut().finish_acquire();
        debug!(
            "Acquired {} ({} values)",
            self.name(),
            self.core().values().len()
        );
        Ok(failures)
    }

    /// Emits every submode acquired in this cycle.
    async fn send(&mut self, ctx: &RunContext, emitter: &Emitter) -> IndicatorResult<SendReport> {
        self.core_mut().begin_send()?;
        debug!("Sending {}", self.name());

        let submodes = match self.cycle_submodes(ctx).await {
            Ok(submodes) => submodes,
            Err(e) => {
                self.core_mut().abort_send();
                return Err(e);
            }
        };
        let mut report = SendReport::default();
        for submode in &submodes {
            match self.core().send_submode(emitter, &submode.key()).await {
                Ok(sent) => report.merge(sent),
                Err(e) => {
                    self.core_mut().abort_send();
                    return Err(e);
                }
            }
        }

        self.core_mut().finish_send();
        Ok(report)
    }

    async fn send_submode(&self, emitter: &Emitter, submode: &str) -> IndicatorResult<SendReport> {
        self.core().send_submode(emitter, submode).await
    }
}

/// Error for a submode an indicator advertises but cannot compute.
pub fn unhandled(core: &IndicatorCore, submode: &Submode) -> IndicatorError {
    IndicatorError::UnhandledSubmode {
        indicator: core.name().to_string(),
        submode: submode.key(),
    }
}

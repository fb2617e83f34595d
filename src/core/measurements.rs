//! User-defined SQL measurements.
//!
//! Definitions are stored as rows of the custom measurement table. Each row
//! is either site-wide (one submode) or scoped to a context whose instances,
//! narrowed by allow/deny id lists, each get their own submode.

use std::{collections::BTreeMap, fmt, sync::Arc};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use validator::{Validate, ValidationError};

use super::{
    indicators::{
        error::IndicatorError,
        types::{IndicatorResult, Rate},
        value::Value,
    },
    store::{DataStore, Params, Record},
};

/// Table holding measurement definitions.
pub const CUSTOM_TABLE: &str = "report_zabbix_custom";

static ID_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,\s]+").expect("valid separator regex"));
static SHORTNAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid shortname regex"));
static STARTS_WITH_SELECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^select\b").expect("valid select regex"));
static MEAS_ALIAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bas\s+meas\b").expect("valid alias regex"));
static INSTANCE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(?:coursecat|course|module|user|cohort)\.(\d+)\.").expect("valid instance key regex")
});

/// Scope a measurement is computed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementContext {
    System,
    Coursecat,
    Course,
    Module,
    User,
    Cohort,
}

impl MeasurementContext {
    pub const ALL: [MeasurementContext; 6] = [
        MeasurementContext::System,
        MeasurementContext::Coursecat,
        MeasurementContext::Course,
        MeasurementContext::Module,
        MeasurementContext::User,
        MeasurementContext::Cohort,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MeasurementContext::System => "system",
            MeasurementContext::Coursecat => "coursecat",
            MeasurementContext::Course => "course",
            MeasurementContext::Module => "module",
            MeasurementContext::User => "user",
            MeasurementContext::Cohort => "cohort",
        }
    }

    /// Context level as stored by the host application. Cohorts have none.
    pub fn level(self) -> Option<i64> {
        match self {
            MeasurementContext::System => Some(10),
            MeasurementContext::User => Some(30),
            MeasurementContext::Coursecat => Some(40),
            MeasurementContext::Course => Some(50),
            MeasurementContext::Module => Some(70),
            MeasurementContext::Cohort => None,
        }
    }

    /// Reads a stored context, given either as a level or as a name.
    pub fn from_value(value: &Value) -> IndicatorResult<Self> {
        let found = match value.as_i64() {
            Some(level) => Self::ALL.into_iter().find(|c| c.level() == Some(level)),
            None => {
                let name = value.to_string();
                Self::ALL
                    .into_iter()
                    .find(|c| c.as_str().eq_ignore_ascii_case(name.trim()))
            }
        };
        found.ok_or_else(|| IndicatorError::validation("context", format!("unknown context '{}'", value)))
    }

    /// `(table, fields, sort)` of the instances of this context.
    fn instances(self) -> Option<(&'static str, &'static str, &'static str)> {
        match self {
            MeasurementContext::System => None,
            MeasurementContext::Coursecat => Some(("course_categories", "id, name", "name")),
            MeasurementContext::Course => Some(("course", "id, shortname AS name", "shortname")),
            MeasurementContext::Module => Some(("course_modules", "id, name", "name")),
            MeasurementContext::User => Some(("user", "id, username AS name", "username")),
            MeasurementContext::Cohort => Some(("cohort", "id, name", "name")),
        }
    }
}

impl fmt::Display for MeasurementContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One custom measurement row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct MeasurementDefinition {
    pub id: i64,

    #[validate(length(min = 1, message = "Name must not be empty"))]
    pub name: String,

    /// Embedded in metric keys.
    #[validate(custom(function = "validate_shortname"))]
    pub shortname: String,

    #[validate(custom(function = "validate_units"))]
    pub units: String,

    pub active: bool,

    /// Single SELECT yielding a `meas` column. Scoped measurements may use `:instanceid`.
    #[validate(custom(function = "validate_select"))]
    pub sqlstatement: String,

    pub context: MeasurementContext,

    /// `*`, or ids separated by commas or spaces.
    pub allow: String,

    /// Ids separated by commas or spaces.
    pub deny: String,

    pub rate: Rate,
}

fn validation_error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_shortname(shortname: &str) -> Result<(), ValidationError> {
    if SHORTNAME.is_match(shortname) {
        Ok(())
    } else {
        Err(validation_error(
            "invalid_shortname",
            format!("Shortname '{}' must only use letters, digits, '_' and '-'", shortname),
        ))
    }
}

fn validate_units(units: &str) -> Result<(), ValidationError> {
    if units.is_empty() {
        return Ok(());
    }
    validate_shortname(units).map_err(|_| {
        validation_error(
            "invalid_units",
            format!("Units '{}' must only use letters, digits, '_' and '-'", units),
        )
    })
}

fn validate_select(sql: &str) -> Result<(), ValidationError> {
    let statement = sql.trim();
    let statement = statement.strip_suffix(';').unwrap_or(statement).trim_end();
    if !STARTS_WITH_SELECT.is_match(statement) {
        return Err(validation_error(
            "not_select",
            "Statement must be a SELECT".to_string(),
        ));
    }
    if statement.contains(';') {
        return Err(validation_error(
            "multiple_statements",
            "Only one statement is allowed".to_string(),
        ));
    }
    if !MEAS_ALIAS.is_match(statement) {
        return Err(validation_error(
            "missing_meas_alias",
            "Statement must alias its result column AS meas".to_string(),
        ));
    }
    Ok(())
}

impl MeasurementDefinition {
    /// Reads a stored row.
    pub fn from_record(record: &Record) -> IndicatorResult<Self> {
        const OP: &str = "load_measurements";
        let rate_code = record.require_i64("rate", OP)?;
        let context = record
            .get("context")
            .ok_or_else(|| IndicatorError::query(OP, "missing column 'context'"))?;
        Ok(MeasurementDefinition {
            id: record.require_i64("id", OP)?,
            name: record.require_str("name", OP)?,
            shortname: record.require_str("shortname", OP)?,
            units: record.get_str("units").unwrap_or_default(),
            active: record.get_i64("active").unwrap_or(0) != 0,
            sqlstatement: record.require_str("sqlstatement", OP)?,
            context: MeasurementContext::from_value(context)?,
            allow: record.get_str("allow").unwrap_or_default(),
            deny: record.get_str("deny").unwrap_or_default(),
            rate: Rate::from_code(rate_code)
                .ok_or_else(|| IndicatorError::query(OP, format!("unknown rate code {}", rate_code)))?,
        })
    }

    /// Tail shared by every key of this measurement.
    fn key_tail(&self) -> String {
        if self.units.is_empty() {
            self.shortname.clone()
        } else {
            format!("{}.{}", self.shortname, self.units)
        }
    }

    /// `[shortname.units]`
    pub fn system_key(&self) -> String {
        format!("[{}]", self.key_tail())
    }

    /// `[context.instanceid.shortname.units]`
    pub fn instance_key(&self, instance_id: i64) -> String {
        format!("[{}.{}.{}]", self.context, instance_id, self.key_tail())
    }
}

/// Instance filter derived from allow/deny lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectFilter {
    All,
    Only(Vec<i64>),
    Except(Vec<i64>),
    Nothing,
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
}

impl SelectFilter {
    pub fn to_sql(&self) -> String {
        match self {
            SelectFilter::All => "1 = 1".to_string(),
            SelectFilter::Only(ids) => format!("id IN ({})", join_ids(ids)),
            SelectFilter::Except(ids) => format!("id NOT IN ({})", join_ids(ids)),
            SelectFilter::Nothing => "1 = 0".to_string(),
        }
    }

    pub fn matches(&self, id: i64) -> bool {
        match self {
            SelectFilter::All => true,
            SelectFilter::Only(ids) => ids.contains(&id),
            SelectFilter::Except(ids) => !ids.contains(&id),
            SelectFilter::Nothing => false,
        }
    }
}

fn parse_ids(field: &str, raw: &str) -> IndicatorResult<Vec<i64>> {
    ID_SEPARATORS
        .split(raw.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| {
                IndicatorError::validation(field, format!("'{}' is not an integer id", s))
            })
        })
        .collect()
}

/// Builds the instance filter of a definition. Every id must be an integer.
pub fn compute_select(definition: &MeasurementDefinition) -> IndicatorResult<SelectFilter> {
    let deny = parse_ids("deny", &definition.deny)?;
    let allow = definition.allow.trim();

    if allow == "*" {
        return Ok(if deny.is_empty() {
            SelectFilter::All
        } else {
            SelectFilter::Except(deny)
        });
    }

    let allowed = parse_ids("allow", allow)?;
    if allowed.is_empty() {
        return Ok(if deny.is_empty() {
            SelectFilter::Nothing
        } else {
            SelectFilter::Except(deny)
        });
    }

    let mut kept: Vec<i64> = allowed.into_iter().filter(|id| !deny.contains(id)).collect();
    kept.dedup();
    Ok(if kept.is_empty() {
        SelectFilter::Nothing
    } else {
        SelectFilter::Only(kept)
    })
}

/// Target of a rendered custom submode key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmodeTarget {
    /// Definition id, used for acquisition.
    Definition(i64),
    /// Human label, used for display.
    Label(String),
}

/// A definition left out of a catalog read, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDefinition {
    /// Shortname, or `#<id>` when the row could not be read.
    pub definition: String,
    pub error: String,
}

impl SkippedDefinition {
    fn new(definition: impl Into<String>, error: impl fmt::Display) -> Self {
        SkippedDefinition {
            definition: definition.into(),
            error: error.to_string(),
        }
    }
}

/// Usable part of a catalog read, and the definitions that were skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogRead<T> {
    pub items: T,
    pub skipped: Vec<SkippedDefinition>,
}

fn row_label(record: &Record) -> String {
    record
        .get_str("shortname")
        .filter(|s| !s.is_empty())
        .or_else(|| record.get_i64("id").map(|id| format!("#{}", id)))
        .unwrap_or_else(|| "#?".to_string())
}

/// Access to stored measurement definitions.
pub struct MeasurementCatalog {
    store: Arc<dyn DataStore>,
}

impl MeasurementCatalog {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        MeasurementCatalog { store }
    }

    /// Active definitions captured at `rate`, ordered by id.
    ///
    /// Unreadable rows are skipped and reported; only a failing catalog query
    /// is an error.
    pub async fn load_measurements(
        &self,
        rate: Rate,
    ) -> IndicatorResult<CatalogRead<Vec<MeasurementDefinition>>> {
        let rows = self
            .store
            .get_records_select(
                CUSTOM_TABLE,
                "rate = ? AND active = 1",
                &Params::positional([rate.code()]),
                "id",
                "*",
            )
            .await?;

        let mut read = CatalogRead::<Vec<MeasurementDefinition>>::default();
        for row in &rows {
            match MeasurementDefinition::from_record(row) {
                Ok(definition) => read.items.push(definition),
                Err(e) => {
                    let label = row_label(row);
                    warn!("Skipping measurement {}: {}", label, e);
                    read.skipped.push(SkippedDefinition::new(label, e));
                }
            }
        }
        debug!(
            "Loaded {} {} measurements, skipped {}",
            read.items.len(),
            rate,
            read.skipped.len()
        );
        Ok(read)
    }

    /// Renders the submode keys of `definitions`, mapped to their definition
    /// id, or to a display label when `as_names` is set.
    ///
    /// A definition whose filter or instance lookup fails is skipped as a
    /// whole; the others are unaffected.
    pub async fn get_custom_submodes(
        &self,
        definitions: &[MeasurementDefinition],
        as_names: bool,
    ) -> CatalogRead<BTreeMap<String, SubmodeTarget>> {
        let mut read = CatalogRead::<BTreeMap<String, SubmodeTarget>>::default();
        for definition in definitions {
            match self.definition_submodes(definition, as_names).await {
                Ok(submodes) => read.items.extend(submodes),
                Err(e) => {
                    warn!("Skipping measurement '{}': {}", definition.shortname, e);
                    read.skipped
                        .push(SkippedDefinition::new(definition.shortname.clone(), e));
                }
            }
        }
        read
    }

    async fn definition_submodes(
        &self,
        definition: &MeasurementDefinition,
        as_names: bool,
    ) -> IndicatorResult<Vec<(String, SubmodeTarget)>> {
        let Some((table, fields, sort)) = definition.context.instances() else {
            let target = if as_names {
                SubmodeTarget::Label(definition.name.clone())
            } else {
                SubmodeTarget::Definition(definition.id)
            };
            return Ok(vec![(definition.system_key(), target)]);
        };

        let select = compute_select(definition)?;
        if select == SelectFilter::Nothing {
            trace!("Measurement '{}' selects no instance", definition.shortname);
            return Ok(Vec::new());
        }
        let instances = self
            .store
            .get_records_select(table, &select.to_sql(), &Params::None, sort, fields)
            .await?;
        instances
            .iter()
            .map(|instance| {
                let id = instance.require_i64("id", table)?;
                let target = if as_names {
                    let name = instance.get_str("name").unwrap_or_default();
                    SubmodeTarget::Label(format!("{} in \"{}\"", definition.name, name))
                } else {
                    SubmodeTarget::Definition(definition.id)
                };
                Ok((definition.instance_key(id), target))
            })
            .collect()
    }

    /// Runs the stored statement of `definition` for submode `key`.
    ///
    /// Scoped measurements get the instance id of the key bound as `instanceid`.
    /// A result without a `meas` column yields empty text.
    pub async fn acquire(&self, definition: &MeasurementDefinition, key: &str) -> IndicatorResult<Value> {
        let params = match definition.context {
            MeasurementContext::System => Params::None,
            _ => {
                let id = instance_id(key).ok_or_else(|| {
                    IndicatorError::Config(format!("No instance id in custom submode '{}'", key))
                })?;
                Params::named("instanceid", id)
            }
        };
        let record = self
            .store
            .get_record_sql(&definition.sqlstatement, &params)
            .await?;
        Ok(record
            .and_then(|r| r.get("meas").cloned())
            .unwrap_or_else(|| Value::Text(String::new())))
    }

    /// Checks a definition before it is stored.
    ///
    /// # Errors
    ///
    /// `Validation` naming the first offending field.
    pub fn validate_for_save(
        definition: &MeasurementDefinition,
        existing: &[MeasurementDefinition],
    ) -> IndicatorResult<()> {
        definition.validate()?;
        compute_select(definition)?;

        let others = existing.iter().filter(|e| e.id != definition.id);
        for other in others {
            if other.name == definition.name {
                return Err(IndicatorError::validation(
                    "name",
                    format!("a measurement named '{}' already exists", definition.name),
                ));
            }
            if other.shortname == definition.shortname {
                return Err(IndicatorError::validation(
                    "shortname",
                    format!("shortname '{}' is already used", definition.shortname),
                ));
            }
        }
        Ok(())
    }
}

/// Instance id embedded in a scoped custom submode key.
pub fn instance_id(key: &str) -> Option<i64> {
    INSTANCE_KEY
        .captures(key)
        .and_then(|caps| caps[1].parse().ok())
}

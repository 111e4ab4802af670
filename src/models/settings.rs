//! Session setting models.
//!
//! Every tunable of the session has a [`Setting`] name, a typed global default and
//! can be overridden per thread or per database with a [`SettingValue`].

use crate::models::connection::DatabaseDescriptor;
use serde::{Deserialize, Serialize};

/// Names of every overridable setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Setting {
    DriverName,
    ConnectOptions,
    DatabaseName,
    UserName,
    Password,
    HostName,
    Port,
    TraceSqlQuery,
    TraceSqlRecord,
    TraceSqlBoundValues,
    TraceSqlBoundValuesOnError,
    SqlPlaceholderStyle,
    SessionThrowable,
    SessionAutoTransaction,
    ValidatorThrowable,
    AutoReplaceSqlAliasIntoQuery,
    VerifyOffsetRelation,
    AddAutoIncrementIdToUpdateQuery,
    ForceParentIdToAllChildren,
    AddSqlSquareBracketsForTableName,
    AddSqlSquareBracketsForColumnName,
    FormatSqlQueryBeforeLogging,
    SqlDelimiterForTableName,
    SqlDelimiterForColumnName,
    TraceSqlOnlySlowQueriesDatabase,
    TraceSqlOnlySlowQueriesTotal,
    DisplayTimerDetails,
}

impl Setting {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DriverName => "DriverName",
            Self::ConnectOptions => "ConnectOptions",
            Self::DatabaseName => "DatabaseName",
            Self::UserName => "UserName",
            Self::Password => "Password",
            Self::HostName => "HostName",
            Self::Port => "Port",
            Self::TraceSqlQuery => "TraceSqlQuery",
            Self::TraceSqlRecord => "TraceSqlRecord",
            Self::TraceSqlBoundValues => "TraceSqlBoundValues",
            Self::TraceSqlBoundValuesOnError => "TraceSqlBoundValuesOnError",
            Self::SqlPlaceholderStyle => "SqlPlaceHolderStyle",
            Self::SessionThrowable => "SessionThrowable",
            Self::SessionAutoTransaction => "SessionAutoTransaction",
            Self::ValidatorThrowable => "ValidatorThrowable",
            Self::AutoReplaceSqlAliasIntoQuery => "AutoReplaceSqlAliasIntoQuery",
            Self::VerifyOffsetRelation => "VerifyOffsetRelation",
            Self::AddAutoIncrementIdToUpdateQuery => "AddAutoIncrementIdToUpdateQuery",
            Self::ForceParentIdToAllChildren => "ForceParentIdToAllChildren",
            Self::AddSqlSquareBracketsForTableName => "AddSqlSquareBracketsForTableName",
            Self::AddSqlSquareBracketsForColumnName => "AddSqlSquareBracketsForColumnName",
            Self::FormatSqlQueryBeforeLogging => "FormatSqlQueryBeforeLogging",
            Self::SqlDelimiterForTableName => "SqlDelimiterForTableName",
            Self::SqlDelimiterForColumnName => "SqlDelimiterForColumnName",
            Self::TraceSqlOnlySlowQueriesDatabase => "TraceSqlOnlySlowQueriesDatabase",
            Self::TraceSqlOnlySlowQueriesTotal => "TraceSqlOnlySlowQueriesTotal",
            Self::DisplayTimerDetails => "DisplayTimerDetails",
        }
    }
}

impl std::fmt::Display for Setting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value stored in an override tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
    /// Explicit "no value" for optional settings
    Absent,
}

/// Conversion between typed setting values and [`SettingValue`].
pub trait SettingType: Sized {
    fn from_setting(value: SettingValue) -> Option<Self>;
    fn into_setting(self) -> SettingValue;
}

impl SettingType for bool {
    fn from_setting(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::Bool(b) => Some(b),
            SettingValue::Int(i) => Some(i != 0),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Bool(self)
    }
}

impl SettingType for String {
    fn from_setting(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::Text(s) => Some(s),
            SettingValue::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Text(self)
    }
}

impl SettingType for Vec<String> {
    fn from_setting(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::List(list) => Some(list),
            SettingValue::Text(s) => Some(vec![s]),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::List(self)
    }
}

impl SettingType for u16 {
    fn from_setting(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::Int(i) => u16::try_from(i).ok(),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Int(i64::from(self))
    }
}

impl SettingType for u64 {
    fn from_setting(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::Int(i) => u64::try_from(i).ok(),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Int(i64::try_from(self).unwrap_or(i64::MAX))
    }
}

impl<T: SettingType> SettingType for Option<T> {
    fn from_setting(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::Absent => Some(None),
            other => T::from_setting(other).map(Some),
        }
    }

    fn into_setting(self) -> SettingValue {
        match self {
            Some(v) => v.into_setting(),
            None => SettingValue::Absent,
        }
    }
}

/// Placeholder syntax used when building SQL with bound values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// `?`
    QuestionMark,
    /// `:name`
    #[default]
    TwoPointName,
    /// `@name`
    AtName,
}

impl PlaceholderStyle {
    fn code(self) -> i64 {
        match self {
            Self::QuestionMark => 0,
            Self::TwoPointName => 1,
            Self::AtName => 2,
        }
    }
}

impl SettingType for PlaceholderStyle {
    fn from_setting(value: SettingValue) -> Option<Self> {
        match value {
            SettingValue::Int(0) => Some(Self::QuestionMark),
            SettingValue::Int(1) => Some(Self::TwoPointName),
            SettingValue::Int(2) => Some(Self::AtName),
            _ => None,
        }
    }

    fn into_setting(self) -> SettingValue {
        SettingValue::Int(self.code())
    }
}

/// Behavior flags of a session, each with a single global default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorFlags {
    pub trace_sql_query: bool,
    pub trace_sql_record: bool,
    pub trace_sql_bound_values: bool,
    pub trace_sql_bound_values_on_error: bool,
    pub sql_placeholder_style: PlaceholderStyle,
    pub session_throwable: bool,
    pub session_auto_transaction: bool,
    pub validator_throwable: bool,
    pub auto_replace_sql_alias_into_query: bool,
    /// Debug aid for relation fetching
    pub verify_offset_relation: bool,
    /// Off for SQL Server compatibility
    pub add_auto_increment_id_to_update_query: bool,
    pub force_parent_id_to_all_children: bool,
    pub add_sql_square_brackets_for_table_name: bool,
    pub add_sql_square_brackets_for_column_name: bool,
    pub format_sql_query_before_logging: bool,
    pub sql_delimiter_for_table_name: Vec<String>,
    pub sql_delimiter_for_column_name: Vec<String>,
    /// Milliseconds; `None` traces every query
    pub trace_sql_only_slow_queries_database: Option<u64>,
    /// Milliseconds; `None` traces every query
    pub trace_sql_only_slow_queries_total: Option<u64>,
    pub display_timer_details: bool,
}

impl Default for BehaviorFlags {
    fn default() -> Self {
        Self {
            trace_sql_query: true,
            trace_sql_record: false,
            trace_sql_bound_values: false,
            trace_sql_bound_values_on_error: true,
            sql_placeholder_style: PlaceholderStyle::TwoPointName,
            session_throwable: false,
            session_auto_transaction: true,
            validator_throwable: false,
            auto_replace_sql_alias_into_query: true,
            verify_offset_relation: false,
            add_auto_increment_id_to_update_query: true,
            force_parent_id_to_all_children: false,
            add_sql_square_brackets_for_table_name: false,
            add_sql_square_brackets_for_column_name: false,
            format_sql_query_before_logging: false,
            sql_delimiter_for_table_name: Vec::new(),
            sql_delimiter_for_column_name: Vec::new(),
            trace_sql_only_slow_queries_database: None,
            trace_sql_only_slow_queries_total: None,
            display_timer_details: false,
        }
    }
}

/// Where a setter writes: the current thread, a given database, both, or neither (global).
#[derive(Debug, Clone, Copy, Default)]
pub struct SettingTarget<'a> {
    pub current_thread: bool,
    pub database: Option<&'a DatabaseDescriptor>,
}

impl<'a> SettingTarget<'a> {
    /// Update the global default.
    pub const GLOBAL: SettingTarget<'static> = SettingTarget {
        current_thread: false,
        database: None,
    };

    /// Override for the calling thread only.
    pub fn current_thread() -> Self {
        Self {
            current_thread: true,
            database: None,
        }
    }

    /// Override for one database only.
    pub fn database(descriptor: &'a DatabaseDescriptor) -> Self {
        Self {
            current_thread: false,
            database: Some(descriptor),
        }
    }

    /// Add a database override to this target.
    pub fn and_database(self, descriptor: &'a DatabaseDescriptor) -> Self {
        Self {
            database: Some(descriptor),
            ..self
        }
    }

    pub fn is_global(&self) -> bool {
        !self.current_thread && self.database.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_behavior_flag_defaults() {
        let flags = BehaviorFlags::default();
        assert!(flags.trace_sql_query);
        assert!(!flags.trace_sql_record);
        assert!(flags.trace_sql_bound_values_on_error);
        assert!(flags.session_auto_transaction);
        assert_eq!(flags.sql_placeholder_style, PlaceholderStyle::TwoPointName);
        assert!(flags.trace_sql_only_slow_queries_total.is_none());
    }

    #[test]
    fn test_optional_setting_absent() {
        assert_eq!(None::<u16>.into_setting(), SettingValue::Absent);
        assert_eq!(
            Option::<u16>::from_setting(SettingValue::Absent),
            Some(None)
        );
        assert_eq!(
            Option::<u16>::from_setting(SettingValue::Int(5432)),
            Some(Some(5432))
        );
    }

    #[test]
    fn test_mismatched_value_is_rejected() {
        assert_eq!(bool::from_setting(SettingValue::Text("yes".into())), None);
        assert_eq!(u16::from_setting(SettingValue::Int(70_000)), None);
        assert_eq!(PlaceholderStyle::from_setting(SettingValue::Int(9)), None);
    }

    #[test]
    fn test_placeholder_style_code() {
        for style in [
            PlaceholderStyle::QuestionMark,
            PlaceholderStyle::TwoPointName,
            PlaceholderStyle::AtName,
        ] {
            assert_eq!(PlaceholderStyle::from_setting(style.into_setting()), Some(style));
        }
    }

    #[test]
    fn test_setting_target_builders() {
        let descriptor = DatabaseDescriptor::new("QSQLITE", "", "a.db");
        assert!(SettingTarget::GLOBAL.is_global());
        assert!(!SettingTarget::current_thread().is_global());
        let both = SettingTarget::current_thread().and_database(&descriptor);
        assert!(both.current_thread);
        assert_eq!(both.database, Some(&descriptor));
    }

    #[test]
    fn test_setting_names() {
        assert_eq!(Setting::DriverName.to_string(), "DriverName");
        assert_eq!(Setting::SqlPlaceholderStyle.as_str(), "SqlPlaceHolderStyle");
    }
}

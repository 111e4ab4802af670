//! Accessor generation for session settings.
//!
//! Every setting follows the same shape: the getter resolves the scoped override
//! and falls back to the global default, the setter stores a scoped override or
//! writes the default. This macro expands one getter/setter pair per setting
//! inside `impl SessionManager`.

/// Generate getter/setter pairs on `SessionManager`.
///
/// # Example
///
/// ```ignore
/// impl SessionManager {
///     session_settings! {
///         /// Trace each SQL query executed.
///         trace_sql_query, set_trace_sql_query: bool = flags.trace_sql_query, Setting::TraceSqlQuery;
///     }
/// }
/// ```
macro_rules! session_settings {
    ($(
        $(#[$meta:meta])*
        $get:ident, $set:ident : $ty:ty = $group:ident . $field:ident, $setting:expr;
    )+) => {
        $(
            $(#[$meta])*
            pub fn $get(&self) -> $ty {
                self.resolve::<$ty>($setting)
                    .unwrap_or_else(|| self.defaults.read().$group.$field.clone())
            }

            $(#[$meta])*
            ///
            /// Writes the global default unless `target` names the current thread
            /// and/or a database.
            pub fn $set(
                &self,
                value: impl Into<$ty>,
                target: $crate::models::SettingTarget<'_>,
            ) -> $crate::error::DbResult<()> {
                let value: $ty = value.into();
                let _guard = self.lock.lock();
                let outcome = self.settings.set(
                    $setting,
                    $crate::models::SettingType::into_setting(value.clone()),
                    target,
                )?;
                if outcome == $crate::db::settings::SetOutcome::UpdateGlobal {
                    self.defaults.write().$group.$field = value;
                }
                Ok(())
            }
        )+
    };
}

// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;

use crate::driver::io::ResponseMeta;
use crate::error_::{DriverError, Result};
use crate::value::Value;

// Imports for docs
#[allow(unused)]
use crate::driver::result_cursor::ResultCursor;

/// Root struct containing statement metadata.
///
/// Obtained from [`ResultCursor::consume()`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Summary {
    /// The text of the statement this summary describes.
    pub statement: String,
    pub statement_type: Option<StatementType>,
    pub counters: Counters,
    pub notifications: Vec<Notification>,
    pub plan: Option<Plan>,
    pub profile: Option<ProfiledPlan>,
    pub database: Option<String>,
}

impl Summary {
    pub(crate) fn parse(statement: &str, mut meta: ResponseMeta) -> Result<Self> {
        let statement_type = StatementType::load_meta(&mut meta)?;
        let counters = Counters::load_meta(&mut meta)?;
        let notifications = Notification::load_meta(&mut meta)?;
        let plan = match meta.remove("plan") {
            None => None,
            Some(plan) => Some(Plan::parse(try_into_map(plan, "plan")?)?),
        };
        let profile = match meta.remove("profile") {
            None => None,
            Some(profile) => Some(ProfiledPlan::parse(try_into_map(profile, "profile")?)?),
        };
        let database = match meta.remove("db") {
            None => None,
            Some(db) => Some(try_into_string(db, "db")?),
        };
        Ok(Self {
            statement: String::from(statement),
            statement_type,
            counters,
            notifications,
            plan,
            profile,
            database,
        })
    }
}

/// What kind of effect running the statement had on the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StatementType {
    ReadOnly,
    WriteOnly,
    ReadWrite,
    SchemaWrite,
}

impl StatementType {
    fn load_meta(meta: &mut ResponseMeta) -> Result<Option<Self>> {
        let Some(statement_type) = meta.remove("type") else {
            return Ok(None);
        };
        let statement_type = try_into_string(statement_type, "type")?;
        Ok(Some(match statement_type.as_str() {
            "r" => Self::ReadOnly,
            "w" => Self::WriteOnly,
            "rw" => Self::ReadWrite,
            "s" => Self::SchemaWrite,
            _ => {
                return Err(DriverError::protocol_violation(format!(
                    "statement type in summary was an unknown string {statement_type:?}"
                )))
            }
        }))
    }
}

/// How many entities of each kind the statement created or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Counters {
    pub nodes_created: i64,
    pub nodes_deleted: i64,
    pub relationships_created: i64,
    pub relationships_deleted: i64,
    pub properties_set: i64,
    pub labels_added: i64,
    pub labels_removed: i64,
    pub indexes_added: i64,
    pub indexes_removed: i64,
    pub constraints_added: i64,
    pub constraints_removed: i64,
    pub contains_updates: bool,
}

impl Counters {
    fn load_meta(meta: &mut ResponseMeta) -> Result<Self> {
        let Some(stats) = meta.remove("stats") else {
            return Ok(Default::default());
        };
        let mut stats = try_into_map(stats, "stats")?;
        let mut counter = |key: &str| {
            stats
                .remove(key)
                .map(|c| try_into_int(c, "counter in stats"))
                .unwrap_or(Ok(0))
        };
        let nodes_created = counter("nodes-created")?;
        let nodes_deleted = counter("nodes-deleted")?;
        let relationships_created = counter("relationships-created")?;
        let relationships_deleted = counter("relationships-deleted")?;
        let properties_set = counter("properties-set")?;
        let labels_added = counter("labels-added")?;
        let labels_removed = counter("labels-removed")?;
        let indexes_added = counter("indexes-added")?;
        let indexes_removed = counter("indexes-removed")?;
        let constraints_added = counter("constraints-added")?;
        let constraints_removed = counter("constraints-removed")?;
        let contains_updates = stats
            .remove("contains-updates")
            .map(|c| try_into_bool(c, "contains-updates in stats"))
            .unwrap_or_else(|| {
                Ok(nodes_created > 0
                    || nodes_deleted > 0
                    || relationships_created > 0
                    || relationships_deleted > 0
                    || properties_set > 0
                    || labels_added > 0
                    || labels_removed > 0
                    || indexes_added > 0
                    || indexes_removed > 0
                    || constraints_added > 0
                    || constraints_removed > 0)
            })?;
        Ok(Self {
            nodes_created,
            nodes_deleted,
            relationships_created,
            relationships_deleted,
            properties_set,
            labels_added,
            labels_removed,
            indexes_added,
            indexes_removed,
            constraints_added,
            constraints_removed,
            contains_updates,
        })
    }
}

/// See [`Summary::notifications`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Notification {
    pub code: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub position: Option<Position>,
}

impl Notification {
    fn load_meta(meta: &mut ResponseMeta) -> Result<Vec<Self>> {
        let Some(notifications) = meta.remove("notifications") else {
            return Ok(Vec::new());
        };
        try_into_list(notifications, "notifications")?
            .into_iter()
            .map(|notification| {
                let mut notification = try_into_map(notification, "notifications entry")?;
                let code = match notification.remove("code") {
                    None => Default::default(),
                    Some(code) => try_into_string(code, "code in notification")?,
                };
                let title = match notification.remove("title") {
                    None => Default::default(),
                    Some(title) => try_into_string(title, "title in notification")?,
                };
                let description = match notification.remove("description") {
                    None => Default::default(),
                    Some(description) => {
                        try_into_string(description, "description in notification")?
                    }
                };
                let severity = notification
                    .remove("severity")
                    .map(|severity| try_into_string(severity, "severity in notification"))
                    .transpose()?
                    .as_deref()
                    .map(Severity::from_str)
                    .unwrap_or(Severity::Unknown);
                let position = notification
                    .remove("position")
                    .map(|position| {
                        Position::parse(try_into_map(position, "position in notification")?)
                    })
                    .transpose()?;
                Ok(Self {
                    code,
                    title,
                    description,
                    severity,
                    position,
                })
            })
            .collect()
    }
}

/// See [`Notification::severity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Severity {
    Warning,
    Information,
    /// Used when the server provides a severity the driver is unaware of.
    Unknown,
}

impl Severity {
    fn from_str(s: &str) -> Self {
        match s {
            "WARNING" => Self::Warning,
            "INFORMATION" => Self::Information,
            _ => Self::Unknown,
        }
    }
}

/// Where in the statement text a [`Notification`] points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct Position {
    /// Character offset into the statement text, starting at 0.
    pub offset: i64,
    /// Line number, starting at 1.
    pub line: i64,
    /// Column number, starting at 1.
    pub column: i64,
}

impl Position {
    fn parse(mut meta: HashMap<String, Value>) -> Result<Self> {
        let offset = match meta.remove("offset") {
            None => Default::default(),
            Some(offset) => try_into_int(offset, "offset in position")?,
        };
        let line = match meta.remove("line") {
            None => Default::default(),
            Some(line) => try_into_int(line, "line in position")?,
        };
        let column = match meta.remove("column") {
            None => Default::default(),
            Some(column) => try_into_int(column, "column in position")?,
        };
        Ok(Self {
            offset,
            line,
            column,
        })
    }
}

/// The server-side execution plan of the statement.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Plan {
    pub operator_type: String,
    pub identifiers: Vec<String>,
    pub arguments: HashMap<String, Value>,
    pub children: Vec<Plan>,
}

impl Plan {
    fn parse(mut meta: HashMap<String, Value>) -> Result<Self> {
        let (operator_type, identifiers, arguments) = parse_plan_common(&mut meta)?;
        let children = match meta.remove("children") {
            None => Vec::new(),
            Some(children) => try_into_list(children, "children in plan")?
                .into_iter()
                .map(|child| Plan::parse(try_into_map(child, "child in plan")?))
                .collect::<Result<_>>()?,
        };
        Ok(Self {
            operator_type,
            identifiers,
            arguments,
            children,
        })
    }
}

/// Like [`Plan`] but including measurements of an actual execution.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ProfiledPlan {
    pub operator_type: String,
    pub identifiers: Vec<String>,
    pub arguments: HashMap<String, Value>,
    /// How often the operator touched the storage layer.
    pub db_hits: i64,
    /// How many records the operator produced.
    pub records: i64,
    pub children: Vec<ProfiledPlan>,
}

impl ProfiledPlan {
    fn parse(mut meta: HashMap<String, Value>) -> Result<Self> {
        let (operator_type, identifiers, arguments) = parse_plan_common(&mut meta)?;
        let db_hits = match meta.remove("dbHits") {
            None => Default::default(),
            Some(db_hits) => try_into_int(db_hits, "dbHits in profile")?,
        };
        let records = match meta.remove("rows") {
            None => Default::default(),
            Some(records) => try_into_int(records, "rows in profile")?,
        };
        let children = match meta.remove("children") {
            None => Vec::new(),
            Some(children) => try_into_list(children, "children in profile")?
                .into_iter()
                .map(|child| ProfiledPlan::parse(try_into_map(child, "child in profile")?))
                .collect::<Result<_>>()?,
        };
        Ok(Self {
            operator_type,
            identifiers,
            arguments,
            db_hits,
            records,
            children,
        })
    }
}

fn parse_plan_common(
    meta: &mut HashMap<String, Value>,
) -> Result<(String, Vec<String>, HashMap<String, Value>)> {
    let operator_type = match meta.remove("operatorType") {
        None => Default::default(),
        Some(operator_type) => try_into_string(operator_type, "operatorType in plan")?,
    };
    let identifiers = match meta.remove("identifiers") {
        None => Vec::new(),
        Some(identifiers) => try_into_list(identifiers, "identifiers in plan")?
            .into_iter()
            .map(|identifier| try_into_string(identifier, "identifier in plan"))
            .collect::<Result<_>>()?,
    };
    let arguments = match meta.remove("args") {
        None => Default::default(),
        Some(arguments) => try_into_map(arguments, "args in plan")?,
    };
    Ok((operator_type, identifiers, arguments))
}

fn try_into_int(value: Value, context: &str) -> Result<i64> {
    value
        .try_into_int()
        .map_err(|_| DriverError::protocol_violation(format!("{context} was not an integer")))
}

fn try_into_bool(value: Value, context: &str) -> Result<bool> {
    value
        .try_into_bool()
        .map_err(|_| DriverError::protocol_violation(format!("{context} was not a boolean")))
}

fn try_into_string(value: Value, context: &str) -> Result<String> {
    value
        .try_into_string()
        .map_err(|_| DriverError::protocol_violation(format!("{context} was not a string")))
}

fn try_into_list(value: Value, context: &str) -> Result<Vec<Value>> {
    value
        .try_into_list()
        .map_err(|_| DriverError::protocol_violation(format!("{context} was not a list")))
}

fn try_into_map(value: Value, context: &str) -> Result<HashMap<String, Value>> {
    value
        .try_into_map()
        .map_err(|_| DriverError::protocol_violation(format!("{context} was not a map")))
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::*;

    use crate::value_map;

    #[rstest]
    fn empty_meta_yields_defaults() {
        let summary = Summary::parse("RETURN 1", Default::default()).unwrap();
        assert_eq!(summary.statement, "RETURN 1");
        assert_eq!(summary.statement_type, None);
        assert_eq!(summary.counters, Counters::default());
        assert!(!summary.counters.contains_updates);
        assert!(summary.notifications.is_empty());
        assert!(summary.plan.is_none());
        assert!(summary.profile.is_none());
    }

    #[rstest]
    #[case("r", StatementType::ReadOnly)]
    #[case("w", StatementType::WriteOnly)]
    #[case("rw", StatementType::ReadWrite)]
    #[case("s", StatementType::SchemaWrite)]
    fn statement_type(#[case] raw: &str, #[case] expected: StatementType) {
        let summary = Summary::parse("Q", value_map!({"type": raw})).unwrap();
        assert_eq!(summary.statement_type, Some(expected));
    }

    #[rstest]
    fn unknown_statement_type_is_a_protocol_violation() {
        let error = Summary::parse("Q", value_map!({"type": "x"})).unwrap_err();
        assert_eq!(error.kind(), crate::error_::ErrorKind::Protocol);
    }

    #[rstest]
    fn counters_imply_contains_updates() {
        let summary = Summary::parse(
            "Q",
            value_map!({"stats": {"nodes-created": 2, "labels-added": 1}}),
        )
        .unwrap();
        assert_eq!(summary.counters.nodes_created, 2);
        assert_eq!(summary.counters.labels_added, 1);
        assert_eq!(summary.counters.nodes_deleted, 0);
        assert!(summary.counters.contains_updates);
    }

    #[rstest]
    fn notifications_with_position() {
        let meta = value_map!({
            "notifications": [{
                "code": "Neo.ClientNotification.Statement.CartesianProduct",
                "title": "t",
                "description": "d",
                "severity": "WARNING",
                "position": {"offset": 0, "line": 1, "column": 1}
            }]
        });
        let summary = Summary::parse("Q", meta).unwrap();
        assert_eq!(summary.notifications.len(), 1);
        let notification = &summary.notifications[0];
        assert_eq!(notification.severity, Severity::Warning);
        assert_eq!(
            notification.position,
            Some(Position {
                offset: 0,
                line: 1,
                column: 1
            })
        );
    }

    #[rstest]
    fn profile_tree() {
        let meta = value_map!({
            "profile": {
                "operatorType": "ProduceResults",
                "identifiers": ["n"],
                "args": {},
                "dbHits": 2,
                "rows": 1,
                "children": [{
                    "operatorType": "AllNodesScan",
                    "dbHits": 5,
                    "rows": 1
                }]
            }
        });
        let summary = Summary::parse("Q", meta).unwrap();
        let profile = summary.profile.unwrap();
        assert_eq!(profile.operator_type, "ProduceResults");
        assert_eq!(profile.db_hits, 2);
        assert_eq!(profile.children.len(), 1);
        assert_eq!(profile.children[0].operator_type, "AllNodesScan");
        assert_eq!(profile.children[0].db_hits, 5);
    }
}

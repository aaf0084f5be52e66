use std::str::FromStr;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;
use crate::params::ParamMap;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertUser {
        id: UserId,
        email: String,
        role: UserRole,
    },
    InsertEstablishment(NewEstablishment),
    SetEstablishmentAvailable {
        id: EstablishmentId,
        available: bool,
    },
    DeleteEstablishment {
        id: EstablishmentId,
    },
    InsertUnitType(NewUnitType),
    SetUnitTypeActive {
        id: Ulid,
        active: bool,
    },
    UpsertInventory(InventoryUpsert),
    InsertBooking(ReservationRequest),
    SetBookingStatus {
        id: Ulid,
        status: BookingStatus,
    },
    SelectAvailability {
        establishment_id: EstablishmentId,
        date: NaiveDate,
    },
    SelectSearch {
        prompt: String,
        params: ParamMap,
    },
    SelectBookings(BookingFilter),
    SelectEstablishments {
        owner_id: UserId,
    },
    SelectUnitTypes {
        establishment_id: EstablishmentId,
    },
    SelectInventory {
        establishment_id: EstablishmentId,
        date: NaiveDate,
        item_type: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingFilter {
    Id(Ulid),
    User(UserId),
    Partner(UserId),
}

/// The row shape a statement answers with, known before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Command tag only.
    Tag,
    Offers,
    Search,
    Bookings,
    Establishments,
    UnitTypes,
    Inventory,
}

// Positional column order for INSERTs without a column list.
const USER_COLUMNS: &[&str] = &["id", "email", "role"];
const ESTABLISHMENT_COLUMNS: &[&str] = &[
    "id",
    "owner_id",
    "name",
    "type",
    "city",
    "address",
    "star_rating",
    "has_inventory",
    "amenities",
    "image_url_main",
    "gallery",
];
const UNIT_TYPE_COLUMNS: &[&str] = &[
    "establishment_id",
    "category",
    "code",
    "name",
    "capacity",
    "has_balcony",
    "base_price",
    "total_units",
];
const INVENTORY_COLUMNS: &[&str] = &[
    "owner_id",
    "establishment_id",
    "date",
    "item_type",
    "floor_area",
    "total_units",
    "price",
    "has_balcony",
    "item_image_url",
];
const BOOKING_COLUMNS: &[&str] = &[
    "user_id",
    "establishment_id",
    "start_date",
    "duration",
    "item_type",
    "floor_area",
    "num_guests",
];
const ESTABLISHMENT_STATUS_COLUMNS: &[&str] = &["establishment_id", "available"];
const UNIT_TYPE_STATUS_COLUMNS: &[&str] = &["unit_type_id", "active"];
const BOOKING_STATUS_COLUMNS: &[&str] = &["booking_id", "status"];

fn parse_statement(sql: &str) -> Result<Statement, SqlError> {
    let dialect = PostgreSqlDialect {};
    let mut stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    match stmts.len() {
        0 => Err(SqlError::Empty),
        1 => Ok(stmts.remove(0)),
        n => Err(SqlError::Unsupported(format!("{n} statements in one query"))),
    }
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    match parse_statement(sql)? {
        Statement::Insert(insert) => parse_insert(&insert),
        Statement::Delete(delete) => parse_delete(&delete),
        Statement::Query(query) => parse_select(&query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Result shape by statement kind and table alone, so statements carrying
/// `$n` placeholders can be described before their parameters are bound.
pub fn result_shape(sql: &str) -> ResultShape {
    let Ok(stmt) = parse_statement(sql) else {
        return ResultShape::Tag;
    };
    let table = match &stmt {
        Statement::Insert(insert) => insert_table_name(insert).ok(),
        Statement::Query(query) => select_table_name(query).ok(),
        _ => None,
    };
    let is_select = matches!(stmt, Statement::Query(_));
    match (is_select, table.as_deref()) {
        (true, Some("availability")) => ResultShape::Offers,
        (true, Some("search")) => ResultShape::Search,
        (_, Some("bookings" | "booking_status")) => ResultShape::Bookings,
        (_, Some("establishments" | "establishment_status")) => ResultShape::Establishments,
        (_, Some("unit_types" | "unit_type_status")) => ResultShape::UnitTypes,
        (_, Some("inventory")) => ResultShape::Inventory,
        _ => ResultShape::Tag,
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    match table.as_str() {
        "users" => {
            let row = insert_row(insert, "users", USER_COLUMNS)?;
            Ok(Command::InsertUser {
                id: row.required_int("id")?,
                email: row.required_text("email")?,
                role: row.vocabulary("role")?.unwrap_or(UserRole::Customer),
            })
        }
        "establishments" => {
            let row = insert_row(insert, "establishments", ESTABLISHMENT_COLUMNS)?;
            Ok(Command::InsertEstablishment(NewEstablishment {
                id: row.text("id")?,
                owner_id: row.required_int("owner_id")?,
                name: row.required_text("name")?,
                kind: row.required_vocabulary("type")?,
                city: row.text("city")?.unwrap_or_default(),
                address: row.text("address")?,
                amenities: row.list("amenities")?,
                star_rating: row.small_int("star_rating")?.unwrap_or(0),
                image_url_main: row.text("image_url_main")?,
                image_urls_gallery: row.list("gallery")?,
                has_inventory: row.flag("has_inventory")?.unwrap_or(false),
            }))
        }
        "establishment_status" => {
            let row = insert_row(insert, "establishment_status", ESTABLISHMENT_STATUS_COLUMNS)?;
            Ok(Command::SetEstablishmentAvailable {
                id: row.required_text("establishment_id")?,
                available: row.required_flag("available")?,
            })
        }
        "unit_types" => {
            let row = insert_row(insert, "unit_types", UNIT_TYPE_COLUMNS)?;
            Ok(Command::InsertUnitType(NewUnitType {
                establishment_id: row.required_text("establishment_id")?,
                category: row.vocabulary("category")?.unwrap_or(UnitCategory::Room),
                code: row.required_text("code")?,
                name: row.text("name")?.unwrap_or_default(),
                capacity: row.count("capacity")?,
                has_balcony: row.flag("has_balcony")?,
                base_price: row.int("base_price")?,
                total_units: row.count("total_units")?,
            }))
        }
        "unit_type_status" => {
            let row = insert_row(insert, "unit_type_status", UNIT_TYPE_STATUS_COLUMNS)?;
            Ok(Command::SetUnitTypeActive {
                id: row.required_ulid("unit_type_id")?,
                active: row.required_flag("active")?,
            })
        }
        "inventory" => {
            let row = insert_row(insert, "inventory", INVENTORY_COLUMNS)?;
            Ok(Command::UpsertInventory(InventoryUpsert {
                owner_id: row.required_int("owner_id")?,
                establishment_id: row.required_text("establishment_id")?,
                date: row.required_date("date")?,
                item_type: row.required_text("item_type")?,
                floor_area: row.text("floor_area")?,
                total_units: row.count("total_units")?.unwrap_or(0),
                price: row.required_int("price")?,
                has_balcony: row.flag("has_balcony")?,
                item_image_url: row.text("item_image_url")?,
            }))
        }
        "bookings" => {
            let row = insert_row(insert, "bookings", BOOKING_COLUMNS)?;
            Ok(Command::InsertBooking(ReservationRequest {
                user_id: row.required_int("user_id")?,
                establishment_id: row.required_text("establishment_id")?,
                start_date: row.required_date("start_date")?,
                duration: row.count("duration")?,
                item_type: row.required_text("item_type")?,
                floor_area: row.text("floor_area")?,
                num_guests: row.count("num_guests")?,
            }))
        }
        "booking_status" => {
            let row = insert_row(insert, "booking_status", BOOKING_STATUS_COLUMNS)?;
            Ok(Command::SetBookingStatus {
                id: row.required_ulid("booking_id")?,
                status: row.required_vocabulary("status")?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    match table.as_str() {
        "establishments" => {
            let filters = filter_row("establishments", delete.selection.as_ref())?;
            Ok(Command::DeleteEstablishment {
                id: filters.required_text("id")?,
            })
        }
        "bookings" => Err(SqlError::Unsupported(
            "bookings are never deleted; insert a CANCELLED row into booking_status".into(),
        )),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let table = select_table_name(query)?;
    let selection = match query.body.as_ref() {
        SetExpr::Select(select) => select.selection.as_ref(),
        _ => None,
    };
    match table.as_str() {
        "availability" => {
            let f = filter_row("availability", selection)?;
            Ok(Command::SelectAvailability {
                establishment_id: f.required_text("establishment_id")?,
                date: f.required_date("date")?,
            })
        }
        "search" => {
            let f = filter_row("search", selection)?;
            let prompt = f.text("prompt")?.unwrap_or_default();
            let mut params = ParamMap::new();
            for (column, expr) in &f.cells {
                if column == "prompt" {
                    continue;
                }
                if let Some(value) = json_literal(expr)? {
                    params.insert(column.clone(), value);
                }
            }
            Ok(Command::SelectSearch { prompt, params })
        }
        "bookings" => {
            let f = filter_row("bookings", selection)?;
            let filter = if let Some(id) = f.ulid("id")? {
                BookingFilter::Id(id)
            } else if let Some(user_id) = f.int("user_id")? {
                BookingFilter::User(user_id)
            } else if let Some(partner_id) = f.int("partner_id")? {
                BookingFilter::Partner(partner_id)
            } else {
                return Err(SqlError::Missing {
                    table: "bookings",
                    column: "id, user_id or partner_id".into(),
                });
            };
            Ok(Command::SelectBookings(filter))
        }
        "establishments" => {
            let f = filter_row("establishments", selection)?;
            Ok(Command::SelectEstablishments {
                owner_id: f.required_int("owner_id")?,
            })
        }
        "unit_types" => {
            let f = filter_row("unit_types", selection)?;
            Ok(Command::SelectUnitTypes {
                establishment_id: f.required_text("establishment_id")?,
            })
        }
        "inventory" => {
            let f = filter_row("inventory", selection)?;
            Ok(Command::SelectInventory {
                establishment_id: f.required_text("establishment_id")?,
                date: f.required_date("date")?,
                item_type: f.required_text("item_type")?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── Rows ──────────────────────────────────────────────────────

/// Column → expression pairs from one VALUES row or one WHERE clause.
struct Row<'a> {
    table: &'static str,
    cells: Vec<(String, &'a Expr)>,
}

enum Literal {
    Null,
    Text(String),
    Number(String),
    Bool(bool),
    List(Vec<Literal>),
}

impl<'a> Row<'a> {
    fn literal(&self, column: &str) -> Result<Option<Literal>, SqlError> {
        match self.cells.iter().find(|(c, _)| c == column) {
            Some((_, expr)) => match literal(expr)? {
                Literal::Null => Ok(None),
                lit => Ok(Some(lit)),
            },
            None => Ok(None),
        }
    }

    fn missing(&self, column: &str) -> SqlError {
        SqlError::Missing {
            table: self.table,
            column: column.to_string(),
        }
    }

    fn invalid(&self, column: &str, detail: impl std::fmt::Display) -> SqlError {
        SqlError::Invalid(format!("{}.{column}: {detail}", self.table))
    }

    fn text(&self, column: &str) -> Result<Option<String>, SqlError> {
        Ok(self.literal(column)?.and_then(|lit| match lit {
            Literal::List(items) => Some(
                items
                    .into_iter()
                    .filter_map(literal_text)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            other => literal_text(other),
        }))
    }

    fn required_text(&self, column: &str) -> Result<String, SqlError> {
        self.text(column)?
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| self.missing(column))
    }

    fn int(&self, column: &str) -> Result<Option<i64>, SqlError> {
        match self.literal(column)? {
            None => Ok(None),
            Some(Literal::Number(n) | Literal::Text(n)) => n
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(column, format!("expected an integer, got '{n}'"))),
            Some(_) => Err(self.invalid(column, "expected an integer")),
        }
    }

    fn required_int(&self, column: &str) -> Result<i64, SqlError> {
        self.int(column)?.ok_or_else(|| self.missing(column))
    }

    /// Non-negative integer that fits a `u32`.
    fn count(&self, column: &str) -> Result<Option<u32>, SqlError> {
        self.int(column)?
            .map(|v| u32::try_from(v).map_err(|_| self.invalid(column, format!("{v} is out of range"))))
            .transpose()
    }

    fn small_int(&self, column: &str) -> Result<Option<u8>, SqlError> {
        self.int(column)?
            .map(|v| u8::try_from(v).map_err(|_| self.invalid(column, format!("{v} is out of range"))))
            .transpose()
    }

    fn flag(&self, column: &str) -> Result<Option<bool>, SqlError> {
        match self.literal(column)? {
            None => Ok(None),
            Some(Literal::Bool(b)) => Ok(Some(b)),
            Some(Literal::Text(s) | Literal::Number(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Ok(Some(true)),
                "false" | "f" | "no" | "n" | "0" => Ok(Some(false)),
                _ => Err(self.invalid(column, format!("expected a boolean, got '{s}'"))),
            },
            Some(_) => Err(self.invalid(column, "expected a boolean")),
        }
    }

    fn required_flag(&self, column: &str) -> Result<bool, SqlError> {
        self.flag(column)?.ok_or_else(|| self.missing(column))
    }

    fn required_date(&self, column: &str) -> Result<NaiveDate, SqlError> {
        let raw = self.required_text(column)?;
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|_| self.invalid(column, format!("expected YYYY-MM-DD, got '{raw}'")))
    }

    fn ulid(&self, column: &str) -> Result<Option<Ulid>, SqlError> {
        self.text(column)?
            .map(|s| Ulid::from_string(s.trim()).map_err(|e| self.invalid(column, format!("bad ULID: {e}"))))
            .transpose()
    }

    fn required_ulid(&self, column: &str) -> Result<Ulid, SqlError> {
        self.ulid(column)?.ok_or_else(|| self.missing(column))
    }

    fn vocabulary<T>(&self, column: &str) -> Result<Option<T>, SqlError>
    where
        T: FromStr<Err = UnknownVariant>,
    {
        self.text(column)?
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<T>().map_err(|e| SqlError::Invalid(e.to_string())))
            .transpose()
    }

    fn required_vocabulary<T>(&self, column: &str) -> Result<T, SqlError>
    where
        T: FromStr<Err = UnknownVariant>,
    {
        self.vocabulary(column)?.ok_or_else(|| self.missing(column))
    }

    /// Comma-separated text or an `ARRAY[...]` literal.
    fn list(&self, column: &str) -> Result<Vec<String>, SqlError> {
        let items = match self.literal(column)? {
            None => Vec::new(),
            Some(Literal::List(items)) => items.into_iter().filter_map(literal_text).collect(),
            Some(other) => literal_text(other)
                .map(|s| s.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
        };
        Ok(items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }
}

fn literal_text(lit: Literal) -> Option<String> {
    match lit {
        Literal::Null | Literal::List(_) => None,
        Literal::Text(s) | Literal::Number(s) => Some(s),
        Literal::Bool(b) => Some(b.to_string()),
    }
}

fn literal(expr: &Expr) -> Result<Literal, SqlError> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => match value {
            Value::Null => Ok(Literal::Null),
            Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => Ok(Literal::Text(s.clone())),
            Value::Number(n, _) => Ok(Literal::Number(n.to_string())),
            Value::Boolean(b) => Ok(Literal::Bool(*b)),
            Value::Placeholder(p) => Err(SqlError::Parse(format!("unbound parameter {p}"))),
            other => Err(SqlError::Unsupported(format!("literal {other}"))),
        },
        Expr::UnaryOp {
            op: ast::UnaryOperator::Minus,
            expr,
        } => match literal(expr)? {
            Literal::Number(n) => Ok(Literal::Number(format!("-{n}"))),
            _ => Err(SqlError::Parse(format!("cannot negate {expr}"))),
        },
        Expr::Nested(inner) => literal(inner),
        Expr::Array(array) => array.elem.iter().map(literal).collect::<Result<_, _>>().map(Literal::List),
        other => Err(SqlError::Parse(format!("expected a literal value, got {other}"))),
    }
}

/// WHERE values for the search parameter map, keeping their JSON types.
fn json_literal(expr: &Expr) -> Result<Option<JsonValue>, SqlError> {
    Ok(match literal(expr)? {
        Literal::Null => None,
        Literal::Text(s) => Some(JsonValue::String(s)),
        Literal::Bool(b) => Some(JsonValue::Bool(b)),
        Literal::Number(n) => Some(match n.parse::<i64>() {
            Ok(i) => JsonValue::from(i),
            Err(_) => n
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::String(n)),
        }),
        Literal::List(items) => Some(JsonValue::Array(
            items
                .into_iter()
                .filter_map(literal_text)
                .map(JsonValue::String)
                .collect(),
        )),
    })
}

fn insert_row<'a>(insert: &'a ast::Insert, table: &'static str, columns: &[&str]) -> Result<Row<'a>, SqlError> {
    let source = insert
        .source
        .as_ref()
        .ok_or_else(|| SqlError::Parse("INSERT without VALUES".into()))?;
    let rows = match source.body.as_ref() {
        SetExpr::Values(values) => &values.rows,
        _ => return Err(SqlError::Parse("expected VALUES".into())),
    };
    let values = match rows.as_slice() {
        [row] => row,
        [] => return Err(SqlError::Parse("empty VALUES".into())),
        _ => return Err(SqlError::Unsupported(format!("multi-row INSERT into {table}"))),
    };

    let names: Vec<String> = if insert.columns.is_empty() {
        columns.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if values.len() > names.len() || (!insert.columns.is_empty() && values.len() != names.len()) {
        return Err(SqlError::WrongArity(table, names.len(), values.len()));
    }
    if let Some(unknown) = names.iter().find(|n| !columns.contains(&n.as_str())) {
        return Err(SqlError::UnknownColumn {
            table,
            column: unknown.clone(),
        });
    }
    Ok(Row {
        table,
        cells: names.into_iter().zip(values.iter()).collect(),
    })
}

/// Flatten `a = 1 AND b = 'x'` into a row. Any other predicate is refused.
fn filter_row<'a>(table: &'static str, selection: Option<&'a Expr>) -> Result<Row<'a>, SqlError> {
    fn collect<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
        match expr {
            Expr::Nested(inner) => collect(inner, out),
            Expr::BinaryOp { left, op, right } => match op {
                ast::BinaryOperator::And => {
                    collect(left, out)?;
                    collect(right, out)
                }
                ast::BinaryOperator::Eq => {
                    let column = expr_column_name(left)
                        .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
                    out.push((column, right.as_ref()));
                    Ok(())
                }
                other => Err(SqlError::Unsupported(format!("operator {other} in WHERE"))),
            },
            other => Err(SqlError::Unsupported(format!("predicate {other}"))),
        }
    }

    let mut cells = Vec::new();
    if let Some(expr) = selection {
        collect(expr, &mut cells)?;
    }
    Ok(Row { table, cells })
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into())),
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn select_table_name(query: &ast::Query) -> Result<String, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    match select.from.first() {
        Some(from) => table_factor_name(&from.relation),
        None => Err(SqlError::Parse("SELECT without FROM".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into())),
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn { table: &'static str, column: String },
    WrongArity(&'static str, usize, usize),
    Missing { table: &'static str, column: String },
    /// Well-formed SQL carrying a value the domain rejects.
    Invalid(String),
}

impl SqlError {
    pub fn sqlstate(&self) -> &'static str {
        match self {
            SqlError::Parse(_) | SqlError::Empty => "42601",
            SqlError::Unsupported(_) => "0A000",
            SqlError::UnknownTable(_) => "42P01",
            SqlError::UnknownColumn { .. } => "42703",
            SqlError::WrongArity(..) | SqlError::Missing { .. } | SqlError::Invalid(_) => "22023",
        }
    }
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn { table, column } => write!(f, "unknown column: {table}.{column}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected at most {expected} values, got {got}")
            }
            SqlError::Missing { table, column } => write!(f, "{table}: missing value for {column}"),
            SqlError::Invalid(s) => write!(f, "invalid value: {s}"),
        }
    }
}

impl std::error::Error for SqlError {}

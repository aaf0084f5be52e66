use std::fmt::Debug;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{AuthSource, DefaultServerParameterProvider, LoginInfo, Password, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::messages::data::DataRow;
use pgwire::tokio::TlsAcceptor;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;
use crate::planner::{PlanOutcome, Planner};
use crate::sql::{self, BookingFilter, Command, ResultShape, SqlError};

pub struct LodgrHandler {
    planner: Arc<Planner>,
    query_parser: Arc<LodgrQueryParser>,
}

impl LodgrHandler {
    pub fn new(planner: Arc<Planner>) -> Self {
        Self {
            planner,
            query_parser: Arc::new(LodgrQueryParser),
        }
    }

    fn engine(&self) -> &Engine {
        self.planner.engine()
    }

    /// Execute one command, recording its latency and outcome.
    async fn run(&self, cmd: Command) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        result
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Vec<Response>> {
        let engine = self.engine();
        match cmd {
            Command::InsertUser { id, email, role } => {
                engine.register_user(id, &email, role).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::InsertEstablishment(req) => {
                let est = engine.create_establishment(req).await.map_err(engine_err)?;
                Ok(vec![establishment_rows(&[est])])
            }
            Command::SetEstablishmentAvailable { id, available } => {
                let est = engine
                    .set_establishment_available(&id, available)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![establishment_rows(&[est])])
            }
            Command::DeleteEstablishment { id } => {
                engine.delete_establishment(&id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertUnitType(req) => {
                let ut = engine.add_unit_type(req).await.map_err(engine_err)?;
                Ok(vec![unit_type_rows(&[ut])])
            }
            Command::SetUnitTypeActive { id, active } => {
                let ut = engine.set_unit_type_active(id, active).await.map_err(engine_err)?;
                Ok(vec![unit_type_rows(&[ut])])
            }
            Command::UpsertInventory(req) => {
                let row = engine.upsert_inventory(req).await.map_err(engine_err)?;
                Ok(vec![inventory_rows(&[row])])
            }
            Command::InsertBooking(req) => {
                let booking = engine.reserve(req).await.map_err(engine_err)?;
                Ok(vec![booking_rows(&[booking])])
            }
            Command::SetBookingStatus { id, status } => {
                let booking = engine.update_booking_status(id, status).await.map_err(engine_err)?;
                Ok(vec![booking_rows(&[booking])])
            }
            Command::SelectAvailability { establishment_id, date } => {
                let offers = engine
                    .availability_on(&establishment_id, date)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![rows(offer_schema(), &offers, encode_offer)])
            }
            Command::SelectSearch { prompt, params } => {
                let outcome = self.planner.process(&prompt, &params).await.map_err(engine_err)?;
                Ok(vec![search_rows(&outcome)])
            }
            Command::SelectBookings(filter) => {
                let bookings = match filter {
                    BookingFilter::Id(id) => vec![engine.get_booking(&id).await.map_err(engine_err)?],
                    BookingFilter::User(user_id) => engine.bookings_for_user(user_id).await.map_err(engine_err)?,
                    BookingFilter::Partner(partner_id) => {
                        engine.bookings_for_partner(partner_id).await.map_err(engine_err)?
                    }
                };
                Ok(vec![booking_rows(&bookings)])
            }
            Command::SelectEstablishments { owner_id } => {
                let list = engine.establishments_for_owner(owner_id).await.map_err(engine_err)?;
                Ok(vec![establishment_rows(&list)])
            }
            Command::SelectUnitTypes { establishment_id } => {
                let list = engine.unit_types_of(&establishment_id).await.map_err(engine_err)?;
                Ok(vec![unit_type_rows(&list)])
            }
            Command::SelectInventory {
                establishment_id,
                date,
                item_type,
            } => {
                let row = engine
                    .ledger_row(&establishment_id, date, &item_type)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![inventory_rows(row.as_slice())])
            }
        }
    }
}

// ── Result schemas ───────────────────────────────────────────────

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn offer_schema() -> Vec<FieldInfo> {
    vec![
        field("establishment_id", Type::VARCHAR),
        field("establishment_name", Type::VARCHAR),
        field("city", Type::VARCHAR),
        field("star_rating", Type::INT4),
        field("image_url_main", Type::VARCHAR),
        field("image_urls_gallery", Type::VARCHAR),
        field("item_type", Type::VARCHAR),
        field("floor_area", Type::VARCHAR),
        field("units_available", Type::INT8),
        field("final_price", Type::INT8),
        field("item_image_url", Type::VARCHAR),
        field("capacity", Type::INT8),
        field("has_balcony", Type::BOOL),
    ]
}

/// Questions and offers share one schema, told apart by `kind`.
fn search_schema() -> Vec<FieldInfo> {
    let mut schema = vec![
        field("kind", Type::VARCHAR),
        field("next_key", Type::VARCHAR),
        field("next_question", Type::VARCHAR),
        field("options", Type::VARCHAR),
    ];
    schema.extend(offer_schema());
    schema
}

fn booking_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("user_id", Type::INT8),
        field("establishment_id", Type::VARCHAR),
        field("partner_id", Type::INT8),
        field("start_date", Type::VARCHAR),
        field("duration", Type::INT8),
        field("total_price", Type::INT8),
        field("status", Type::VARCHAR),
        field("booked_item_type", Type::VARCHAR),
        field("booked_floor_area", Type::VARCHAR),
        field("num_guests", Type::INT8),
    ]
}

fn establishment_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("owner_id", Type::INT8),
        field("name", Type::VARCHAR),
        field("type", Type::VARCHAR),
        field("city", Type::VARCHAR),
        field("address", Type::VARCHAR),
        field("amenities", Type::VARCHAR),
        field("star_rating", Type::INT4),
        field("image_url_main", Type::VARCHAR),
        field("gallery", Type::VARCHAR),
        field("available", Type::BOOL),
        field("has_inventory", Type::BOOL),
    ]
}

fn unit_type_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("establishment_id", Type::VARCHAR),
        field("category", Type::VARCHAR),
        field("code", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("capacity", Type::INT8),
        field("has_balcony", Type::BOOL),
        field("base_price", Type::INT8),
        field("total_units", Type::INT8),
        field("active", Type::BOOL),
    ]
}

fn inventory_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("establishment_id", Type::VARCHAR),
        field("date", Type::VARCHAR),
        field("item_type", Type::VARCHAR),
        field("floor_area", Type::VARCHAR),
        field("total_units", Type::INT8),
        field("units_booked", Type::INT8),
        field("units_available", Type::INT8),
        field("price", Type::INT8),
        field("has_balcony", Type::BOOL),
        field("item_image_url", Type::VARCHAR),
    ]
}

fn schema_for(shape: ResultShape) -> Vec<FieldInfo> {
    match shape {
        ResultShape::Tag => vec![],
        ResultShape::Offers => offer_schema(),
        ResultShape::Search => search_schema(),
        ResultShape::Bookings => booking_schema(),
        ResultShape::Establishments => establishment_schema(),
        ResultShape::UnitTypes => unit_type_schema(),
        ResultShape::Inventory => inventory_schema(),
    }
}

// ── Row encoding ─────────────────────────────────────────────────

fn rows<T>(
    schema: Vec<FieldInfo>,
    items: &[T],
    encode: impl Fn(&mut DataRowEncoder, &T) -> PgWireResult<()>,
) -> Response {
    let schema = Arc::new(schema);
    let data: Vec<PgWireResult<DataRow>> = items
        .iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(data)))
}

fn joined(items: &[String]) -> String {
    items.join(",")
}

fn encode_offer(enc: &mut DataRowEncoder, o: &Offer) -> PgWireResult<()> {
    enc.encode_field(&o.establishment_id)?;
    enc.encode_field(&o.establishment_name)?;
    enc.encode_field(&o.city)?;
    enc.encode_field(&i32::from(o.star_rating))?;
    enc.encode_field(&o.image_url_main)?;
    enc.encode_field(&joined(&o.image_urls_gallery))?;
    enc.encode_field(&o.item_type)?;
    enc.encode_field(&o.floor_area)?;
    enc.encode_field(&i64::from(o.units_available))?;
    enc.encode_field(&o.final_price)?;
    enc.encode_field(&o.item_image_url)?;
    enc.encode_field(&o.capacity.map(i64::from))?;
    enc.encode_field(&o.has_balcony)?;
    Ok(())
}

fn search_rows(outcome: &PlanOutcome) -> Response {
    match outcome {
        PlanOutcome::NeedsInput {
            key,
            question,
            options,
            ..
        } => {
            let question_row = (key.clone(), question.clone(), joined(options));
            rows(search_schema(), &[question_row], |enc, (key, question, options)| {
                enc.encode_field(&"question".to_string())?;
                enc.encode_field(key)?;
                enc.encode_field(question)?;
                enc.encode_field(options)?;
                for _ in 0..offer_schema().len() {
                    enc.encode_field(&None::<String>)?;
                }
                Ok(())
            })
        }
        PlanOutcome::Offers(offers) => rows(search_schema(), offers, |enc, offer| {
            enc.encode_field(&"offer".to_string())?;
            enc.encode_field(&None::<String>)?;
            enc.encode_field(&None::<String>)?;
            enc.encode_field(&None::<String>)?;
            encode_offer(enc, offer)
        }),
    }
}

fn booking_rows(bookings: &[Booking]) -> Response {
    rows(booking_schema(), bookings, |enc, b| {
        enc.encode_field(&b.id.to_string())?;
        enc.encode_field(&b.user_id)?;
        enc.encode_field(&b.establishment_id)?;
        enc.encode_field(&b.partner_id)?;
        enc.encode_field(&b.start_date.to_string())?;
        enc.encode_field(&i64::from(b.duration))?;
        enc.encode_field(&b.total_price)?;
        enc.encode_field(&b.status.to_string())?;
        enc.encode_field(&b.booked_item_type)?;
        enc.encode_field(&b.booked_floor_area)?;
        enc.encode_field(&b.num_guests.map(i64::from))?;
        Ok(())
    })
}

fn establishment_rows(list: &[Establishment]) -> Response {
    rows(establishment_schema(), list, |enc, e| {
        enc.encode_field(&e.id)?;
        enc.encode_field(&e.owner_id)?;
        enc.encode_field(&e.name)?;
        enc.encode_field(&e.kind.to_string())?;
        enc.encode_field(&e.city)?;
        enc.encode_field(&e.address)?;
        enc.encode_field(&joined(&e.amenities))?;
        enc.encode_field(&i32::from(e.star_rating))?;
        enc.encode_field(&e.image_url_main)?;
        enc.encode_field(&joined(&e.image_urls_gallery))?;
        enc.encode_field(&e.available)?;
        enc.encode_field(&e.has_inventory)?;
        Ok(())
    })
}

fn unit_type_rows(list: &[UnitType]) -> Response {
    rows(unit_type_schema(), list, |enc, u| {
        enc.encode_field(&u.id.to_string())?;
        enc.encode_field(&u.establishment_id)?;
        enc.encode_field(&u.category.to_string())?;
        enc.encode_field(&u.code)?;
        enc.encode_field(&u.name)?;
        enc.encode_field(&u.capacity.map(i64::from))?;
        enc.encode_field(&u.has_balcony)?;
        enc.encode_field(&u.base_price)?;
        enc.encode_field(&u.total_units.map(i64::from))?;
        enc.encode_field(&u.active)?;
        Ok(())
    })
}

fn inventory_rows(list: &[InventoryDay]) -> Response {
    rows(inventory_schema(), list, |enc, r| {
        enc.encode_field(&r.id.to_string())?;
        enc.encode_field(&r.establishment_id)?;
        enc.encode_field(&r.date.to_string())?;
        enc.encode_field(&r.item_type)?;
        enc.encode_field(&r.floor_area)?;
        enc.encode_field(&i64::from(r.total_units))?;
        enc.encode_field(&i64::from(r.units_booked))?;
        enc.encode_field(&i64::from(r.units_available()))?;
        enc.encode_field(&r.price)?;
        enc.encode_field(&r.has_balcony)?;
        enc.encode_field(&r.item_image_url)?;
        Ok(())
    })
}

#[async_trait]
impl SimpleQueryHandler for LodgrHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.run(cmd).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct LodgrQueryParser;

#[async_trait]
impl QueryParser for LodgrQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(&self, stmt: &String, _column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for(sql::result_shape(stmt)))
    }
}

#[async_trait]
impl ExtendedQueryHandler for LodgrHandler {
    type Statement = String;
    type QueryParser = LodgrQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.run(cmd).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        let schema = schema_for(sql::result_shape(&target.statement));
        Ok(DescribeStatementResponse::new(param_types, schema))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(schema_for(sql::result_shape(
            &target.statement.statement,
        ))))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
        .collect();
    substitute(&portal.statement.statement, &params)
}

fn substitute(sql: &str, params: &[Option<String>]) -> String {
    let mut result = sql.to_string();
    // Highest index first so $1 never clobbers the prefix of $10.
    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(text) => format!("'{}'", text.replace('\'', "''")),
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Auth ─────────────────────────────────────────────────────────

/// One shared cleartext password for every login.
#[derive(Debug)]
pub struct PasswordAuthSource {
    password: String,
}

impl PasswordAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for PasswordAuthSource {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

// ── Factory ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct LodgrFactory {
    handler: Arc<LodgrHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<PasswordAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl LodgrFactory {
    pub fn new(planner: Arc<Planner>, password: String) -> Self {
        let auth_source = PasswordAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(LodgrHandler::new(planner)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(auth_source, param_provider)),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for LodgrFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    factory: LodgrFactory,
    tls_acceptor: Option<TlsAcceptor>,
) -> io::Result<()> {
    pgwire::tokio::process_socket(socket, tls_acceptor, factory).await
}

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept connections until `shutdown` resolves, then wait (bounded) for
/// in-flight connections to finish.
pub async fn serve(
    listener: TcpListener,
    factory: LodgrFactory,
    tls_acceptor: Option<TlsAcceptor>,
    max_connections: usize,
    shutdown: impl Future<Output = ()>,
) {
    let semaphore = Arc::new(Semaphore::new(max_connections));
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(observability::CONNECTIONS_ACTIVE).increment(1.0);
                let factory = factory.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = process_connection(socket, factory, tls).await {
                        error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(DRAIN_TIMEOUT);
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    }
}

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(e.sqlstate(), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error(e.sqlstate(), e.to_string())
}

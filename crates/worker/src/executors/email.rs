use chrono::Utc;
use courier_config::EmailConfig;
use courier_errors::{CourierError, CourierResult};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Module namespace that every lookup falls back to.
const GLOBAL_MODULE: &str = "Global";

const LOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS email_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    module      TEXT    NOT NULL,
    recipient   TEXT    NOT NULL,
    subject     TEXT    NOT NULL,
    status      TEXT    NOT NULL,
    used_backup INTEGER NOT NULL DEFAULT 0,
    message_id  TEXT,
    error       TEXT,
    created_at  TEXT    NOT NULL
);
"#;

const CONFIG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS smtp_service (
    module           TEXT PRIMARY KEY,
    failover_enabled INTEGER NOT NULL DEFAULT 0,
    notify_enabled   INTEGER NOT NULL DEFAULT 0,
    admin_email      TEXT
);
CREATE TABLE IF NOT EXISTS smtp_transport (
    module       TEXT    NOT NULL,
    role         TEXT    NOT NULL,
    host         TEXT    NOT NULL,
    port         INTEGER NOT NULL,
    secure       INTEGER NOT NULL DEFAULT 1,
    username     TEXT,
    password     TEXT,
    from_address TEXT    NOT NULL,
    PRIMARY KEY (module, role)
);
"#;

#[derive(Debug, Deserialize)]
struct EmailPayload {
    to: String,
    subject: String,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    module: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct ServiceSettings {
    failover_enabled: bool,
    notify_enabled: bool,
    admin_email: Option<String>,
}

#[derive(Debug, Clone)]
struct TransportSettings {
    host: String,
    port: u16,
    secure: bool,
    username: Option<String>,
    password: Option<String>,
    from_address: String,
}

struct BuiltTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

/// Per-adapter mutable state. One async mutex serializes sends within a
/// worker, so a mid-send module re-init is never observable from another
/// send in the same process.
struct EmailState {
    module: String,
    service: ServiceSettings,
    main: Option<BuiltTransport>,
    backup: Option<BuiltTransport>,
    use_backup: bool,
    alert_sent: bool,
}

/// Primary/backup SMTP delivery with per-module settings (Global
/// fallback), failover, one-shot admin alerts and a durable send log.
pub struct EmailAdapter {
    config_pool: SqlitePool,
    log_pool: SqlitePool,
    state: Mutex<EmailState>,
}

impl EmailAdapter {
    pub async fn new(config: &EmailConfig) -> CourierResult<Self> {
        let config_pool = open_pool(&config.config_db_path).await?;
        let log_pool = open_pool(&config.log_db_path).await?;
        Self::with_pools(config_pool, log_pool).await
    }

    pub async fn with_pools(config_pool: SqlitePool, log_pool: SqlitePool) -> CourierResult<Self> {
        sqlx::raw_sql(CONFIG_SCHEMA).execute(&config_pool).await?;
        sqlx::raw_sql(LOG_SCHEMA).execute(&log_pool).await?;

        let adapter = Self {
            config_pool,
            log_pool,
            state: Mutex::new(EmailState {
                module: String::new(),
                service: ServiceSettings::default(),
                main: None,
                backup: None,
                use_backup: false,
                alert_sent: false,
            }),
        };

        {
            let mut state = adapter.state.lock().await;
            adapter.init_module(&mut state, GLOBAL_MODULE).await?;
        }
        Ok(adapter)
    }

    /// (Re)load settings and transports for a module. Main build failures
    /// are tolerated when failover can serve from backup.
    async fn init_module(&self, state: &mut EmailState, module: &str) -> CourierResult<()> {
        let service = self.load_service(module).await?;

        let main = match self.load_transport(module, "main").await? {
            Some(settings) => match build_transport(&settings) {
                Ok(built) => Some(built),
                Err(e) if service.failover_enabled => {
                    warn!("main transport for {module} unusable ({e}), relying on backup");
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        let backup = if service.failover_enabled {
            match self.load_transport(module, "backup").await? {
                Some(settings) => Some(build_transport(&settings)?),
                None => None,
            }
        } else {
            None
        };

        state.module = module.to_string();
        // Main missing entirely: serve exclusively from backup.
        state.use_backup = main.is_none() && backup.is_some();
        state.service = service;
        state.main = main;
        state.backup = backup;
        state.alert_sent = false;
        Ok(())
    }

    async fn load_service(&self, module: &str) -> CourierResult<ServiceSettings> {
        for candidate in [module, GLOBAL_MODULE] {
            let row = sqlx::query(
                "SELECT failover_enabled, notify_enabled, admin_email \
                 FROM smtp_service WHERE module = $1",
            )
            .bind(candidate)
            .fetch_optional(&self.config_pool)
            .await?;

            if let Some(row) = row {
                return Ok(ServiceSettings {
                    failover_enabled: row.try_get("failover_enabled")?,
                    notify_enabled: row.try_get("notify_enabled")?,
                    admin_email: row.try_get("admin_email")?,
                });
            }
        }
        Ok(ServiceSettings::default())
    }

    async fn load_transport(
        &self,
        module: &str,
        role: &str,
    ) -> CourierResult<Option<TransportSettings>> {
        for candidate in [module, GLOBAL_MODULE] {
            let row = sqlx::query(
                "SELECT host, port, secure, username, password, from_address \
                 FROM smtp_transport WHERE module = $1 AND role = $2",
            )
            .bind(candidate)
            .bind(role)
            .fetch_optional(&self.config_pool)
            .await?;

            if let Some(row) = row {
                return Ok(Some(TransportSettings {
                    host: row.try_get("host")?,
                    port: row.try_get::<i64, _>("port")? as u16,
                    secure: row.try_get("secure")?,
                    username: row.try_get("username")?,
                    password: row.try_get("password")?,
                    from_address: row.try_get("from_address")?,
                }));
            }
        }
        Ok(None)
    }

    pub async fn send(&self, payload: &serde_json::Value) -> CourierResult<serde_json::Value> {
        let payload: EmailPayload = serde_json::from_value(payload.clone())
            .map_err(|e| CourierError::validation(format!("invalid email payload: {e}")))?;

        let mut state = self.state.lock().await;

        let module = payload.module.as_deref().unwrap_or(GLOBAL_MODULE);
        if module != state.module {
            self.init_module(&mut state, module).await?;
        }

        if state.main.is_none() && state.backup.is_none() {
            self.log_attempt(module, &payload, "failed", false, None, Some("no transport"))
                .await;
            return Err(CourierError::adapter(format!(
                "no SMTP transport available for module {module}"
            )));
        }

        let message_id = format!("<{}@courier>", Uuid::new_v4());
        let start_on_backup = state.use_backup || state.main.is_none();

        if !start_on_backup {
            let main_result = match state.main.as_ref() {
                Some(main) => deliver(main, &payload, &message_id).await,
                None => Err(CourierError::internal("main transport vanished")),
            };
            match main_result {
                Ok(response) => {
                    self.log_attempt(module, &payload, "success", false, Some(&message_id), None)
                        .await;
                    return Ok(json!({
                        "messageId": message_id,
                        "response": response,
                        "usedBackup": false,
                    }));
                }
                Err(main_err) if state.service.failover_enabled && state.backup.is_some() => {
                    warn!("main SMTP failed for {module}: {main_err}; failing over");
                    self.log_attempt(
                        module,
                        &payload,
                        "failed",
                        false,
                        None,
                        Some(&main_err.to_string()),
                    )
                    .await;
                    state.use_backup = true;

                    return self
                        .send_via_backup(&mut state, module, &payload, &message_id, Some(main_err))
                        .await;
                }
                Err(main_err) => {
                    self.log_attempt(
                        module,
                        &payload,
                        "failed",
                        false,
                        None,
                        Some(&main_err.to_string()),
                    )
                    .await;
                    return Err(main_err);
                }
            }
        }

        self.send_via_backup(&mut state, module, &payload, &message_id, None)
            .await
    }

    async fn send_via_backup(
        &self,
        state: &mut EmailState,
        module: &str,
        payload: &EmailPayload,
        message_id: &str,
        main_err: Option<CourierError>,
    ) -> CourierResult<serde_json::Value> {
        let backup_result = match state.backup.as_ref() {
            Some(backup) => deliver(backup, payload, message_id).await,
            None => {
                return Err(main_err.unwrap_or_else(|| {
                    CourierError::adapter(format!(
                        "no backup SMTP transport for module {module}"
                    ))
                }))
            }
        };

        match backup_result {
            Ok(response) => {
                self.log_attempt(module, payload, "success", true, Some(message_id), None)
                    .await;

                // One-shot degraded-mode alert; cleared on recovery.
                if state.service.notify_enabled && !state.alert_sent {
                    if let Some(admin) = state.service.admin_email.clone() {
                        if let Some(backup) = state.backup.as_ref() {
                            self.notify_admin(
                                backup,
                                &admin,
                                "Primary SMTP transport degraded",
                                &format!(
                                    "Delivery for module {module} switched to the backup transport."
                                ),
                            )
                            .await;
                        }
                        state.alert_sent = true;
                    }
                }

                Ok(json!({
                    "messageId": message_id,
                    "response": response,
                    "usedBackup": true,
                }))
            }
            Err(backup_err) => {
                self.log_attempt(
                    module,
                    payload,
                    "failed",
                    true,
                    None,
                    Some(&backup_err.to_string()),
                )
                .await;
                match main_err {
                    Some(main_err) => Err(CourierError::adapter(format!(
                        "main transport: {main_err}; backup transport: {backup_err}"
                    ))),
                    None => Err(backup_err),
                }
            }
        }
    }

    /// Health probe while degraded: if main verifies again, switch back
    /// and (when enabled) announce the recovery.
    pub async fn probe_main(&self) {
        let mut state = self.state.lock().await;
        if !state.use_backup {
            return;
        }
        let Some(main) = state.main.as_ref() else {
            return;
        };

        match main.transport.test_connection().await {
            Ok(true) => {
                info!("main SMTP transport recovered for {}", state.module);
                state.use_backup = false;
                state.alert_sent = false;

                if state.service.notify_enabled {
                    if let (Some(admin), Some(main)) =
                        (state.service.admin_email.clone(), state.main.as_ref())
                    {
                        self.notify_admin(
                            main,
                            &admin,
                            "Primary SMTP transport recovered",
                            &format!(
                                "Delivery for module {} is back on the main transport.",
                                state.module
                            ),
                        )
                        .await;
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!("main SMTP still unreachable: {e}");
            }
        }
    }

    async fn notify_admin(
        &self,
        via: &BuiltTransport,
        admin: &str,
        subject: &str,
        body: &str,
    ) {
        let payload = EmailPayload {
            to: admin.to_string(),
            subject: subject.to_string(),
            html: None,
            text: Some(body.to_string()),
            module: None,
        };
        let message_id = format!("<{}@courier>", Uuid::new_v4());
        if let Err(e) = deliver(via, &payload, &message_id).await {
            warn!("admin notification failed: {e}");
        }
    }

    async fn log_attempt(
        &self,
        module: &str,
        payload: &EmailPayload,
        status: &str,
        used_backup: bool,
        message_id: Option<&str>,
        error: Option<&str>,
    ) {
        let result = sqlx::query(
            "INSERT INTO email_log \
             (module, recipient, subject, status, used_backup, message_id, error, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(module)
        .bind(&payload.to)
        .bind(&payload.subject)
        .bind(status)
        .bind(used_backup)
        .bind(message_id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.log_pool)
        .await;

        if let Err(e) = result {
            warn!("email log write failed: {e}");
        }
    }
}

async fn open_pool(path: &str) -> CourierResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    Ok(SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await?)
}

fn build_transport(settings: &TransportSettings) -> CourierResult<BuiltTransport> {
    let mut builder = if settings.secure {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
            .map_err(|e| CourierError::config(format!("smtp relay {}: {e}", settings.host)))?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
    };
    builder = builder.port(settings.port);

    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
    }

    Ok(BuiltTransport {
        transport: builder.build(),
        from_address: settings.from_address.clone(),
    })
}

async fn deliver(
    built: &BuiltTransport,
    payload: &EmailPayload,
    message_id: &str,
) -> CourierResult<String> {
    let from: Mailbox = built
        .from_address
        .parse()
        .map_err(|e| CourierError::config(format!("bad from address: {e}")))?;
    let to: Mailbox = payload
        .to
        .parse()
        .map_err(|e| CourierError::validation(format!("bad recipient address: {e}")))?;

    let builder = Message::builder()
        .from(from)
        .to(to)
        .subject(&payload.subject)
        .message_id(Some(message_id.to_string()));

    let message = match (&payload.html, &payload.text) {
        (Some(html), _) => builder
            .header(ContentType::TEXT_HTML)
            .body(html.clone())
            .map_err(|e| CourierError::validation(format!("bad email body: {e}")))?,
        (None, Some(text)) => builder
            .header(ContentType::TEXT_PLAIN)
            .body(text.clone())
            .map_err(|e| CourierError::validation(format!("bad email body: {e}")))?,
        (None, None) => {
            return Err(CourierError::validation(
                "email payload needs an html or text body",
            ))
        }
    };

    let response = built
        .transport
        .send(message)
        .await
        .map_err(|e| CourierError::adapter(format!("smtp delivery failed: {e}")))?;

    Ok(response
        .message()
        .collect::<Vec<&str>>()
        .join(" "))
}

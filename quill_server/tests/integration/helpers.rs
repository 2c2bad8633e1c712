use quill::{build_application_state, run};
use quill_server::configuration::{ApplicationProfile, Config};
use sqlx::SqlitePool;
use std::sync::Once;
use tempfile::TempDir;
use tracing::subscriber::set_global_default;
use tracing_subscriber::EnvFilter;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin";

pub struct TestApi {
    pub api_address: String,
    pub api_client: reqwest::Client,
    /// A separate pool on the application database, to set up or inspect state directly.
    pub db_pool: SqlitePool,
    /// The SQLite database lives here, it's deleted when the test ends.
    _database_dir: TempDir,
}

impl TestApi {
    pub async fn spawn() -> Self {
        Self::init_telemetry();
        let database_dir = TempDir::new().expect("Failed to create a temporary directory");
        let config = Self::get_config(&database_dir);

        let application_state = build_application_state(&config.app)
            .await
            .expect("Failed to build the application state");

        let tcp_listener = config
            .server
            .listener()
            .await
            .expect("Failed to bind the server TCP listener");
        let address = tcp_listener
            .local_addr()
            .expect("The server TCP listener doesn't have a local socket address");

        run(tcp_listener, application_state);

        let db_pool = config
            .app
            .database
            .get_pool()
            .await
            .expect("Failed to connect to the test database");

        let api_client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build the HTTP client");

        TestApi {
            api_address: format!("http://{}:{}", config.server.ip, address.port()),
            api_client,
            db_pool,
            _database_dir: database_dir,
        }
    }

    fn get_config(database_dir: &TempDir) -> Config {
        let mut config = Config::load_profile(ApplicationProfile::Test)
            .expect("Failed to load test configuration");
        // A fresh database for every test.
        config.app.database.path = database_dir.path().join("quill.db");
        config
    }

    fn init_telemetry() {
        // Initialize the telemetry setup at most once.
        static INIT_TELEMETRY: Once = Once::new();
        INIT_TELEMETRY.call_once(|| {
            // Only enable the telemetry if the `TEST_LOG` environment variable is set.
            if std::env::var("TEST_LOG").is_ok() {
                let subscriber = tracing_subscriber::fmt::Subscriber::builder()
                    .with_env_filter(
                        EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info")),
                    )
                    .finish();
                // We don't redirect panic messages to the `tracing` subsystem because
                // we want to see them in the test output.
                set_global_default(subscriber).expect("Failed to set a `tracing` global subscriber")
            }
        });
    }
}

/// Convenient methods for calling the API under test.
impl TestApi {
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.api_client
            .get(format!("{}{}", &self.api_address, path))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_html(&self, path: &str) -> String {
        self.get(path)
            .await
            .text()
            .await
            .expect("Failed to read the response body.")
    }

    /// Submit a form, without adding a CSRF token.
    pub async fn post_form(&self, path: &str, fields: &[(&str, &str)]) -> reqwest::Response {
        self.api_client
            .post(format!("{}{}", &self.api_address, path))
            .form(fields)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Load the page at `form_path` to get a CSRF token, then submit
    /// `fields` and the token to `action`.
    pub async fn submit_form(
        &self,
        form_path: &str,
        action: &str,
        fields: &[(&str, &str)],
    ) -> reqwest::Response {
        let html = self.get_html(form_path).await;
        let token = csrf_token(&html);
        let mut fields = fields.to_vec();
        fields.push(("csrf_token", &token));
        self.post_form(action, &fields).await
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> reqwest::Response {
        self.submit_form(
            "/sign-up",
            "/sign-up",
            &[("email", email), ("password", password)],
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.submit_form(
            "/login",
            "/login",
            &[("email", email), ("password", password)],
        )
        .await
    }

    /// Register a regular user and log in with their credentials.
    pub async fn login_as_new_user(&self, email: &str) {
        let response = self.sign_up(email, "a-password").await;
        assert_eq!(response.status().as_u16(), 303);
        let response = self.login(email, "a-password").await;
        assert_eq!(response.status().as_u16(), 303);
    }

    pub async fn login_as_admin(&self) {
        let response = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(response.status().as_u16(), 303);
    }

    pub async fn create_post(&self, title: &str, content: &str) -> reqwest::Response {
        self.submit_form(
            "/create",
            "/create",
            &[("title", title), ("content", content)],
        )
        .await
    }

    pub async fn edit_post(&self, post_id: i64, title: &str, content: &str) -> reqwest::Response {
        self.submit_form(
            "/create",
            &format!("/edit/{post_id}"),
            &[("title", title), ("content", content)],
        )
        .await
    }

    pub async fn delete_post(&self, post_id: i64) -> reqwest::Response {
        self.submit_form("/create", &format!("/delete/{post_id}"), &[])
            .await
    }
}

/// Extract the CSRF token embedded in a form.
pub fn csrf_token(html: &str) -> String {
    let needle = r#"name="csrf_token" value=""#;
    let start = html
        .find(needle)
        .expect("The page doesn't contain a CSRF token")
        + needle.len();
    let end = start + html[start..].find('"').expect("Unterminated CSRF token");
    html[start..end].to_owned()
}

pub fn location(response: &reqwest::Response) -> &str {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .expect("The response is not a redirect")
        .to_str()
        .unwrap()
}

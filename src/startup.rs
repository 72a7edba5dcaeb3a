use actix_web::dev::Server;
use actix_web::{error, middleware::Logger, web, App, HttpResponse, HttpServer};
use chrono::Duration;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AuthApi, AuthResult, AuthService, RotationEngine, Signer, Traced, Validated};
use crate::configuration::JwtSettings;
use crate::error::ConfigError;
use crate::identity::{ClientRegistry, IdentityProvider};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{get_current_user, health_check, login, logout, logout_all, refresh};
use crate::store::RefreshTokenStore;

/// Everything the HTTP layer needs, independent of the storage backend.
#[derive(Clone)]
pub struct AuthComponents {
    pub signer: Signer,
    pub auth: Arc<dyn AuthApi>,
    pub identity: Arc<dyn IdentityProvider>,
}

/// Wire the signer, rotation engine, facade and decorators.
///
/// # Errors
/// Returns `ConfigError` if the signing secret is missing; callers treat this
/// as fatal.
pub fn build_auth(
    jwt: &JwtSettings,
    store: Arc<dyn RefreshTokenStore>,
    identity: Arc<dyn IdentityProvider>,
    clients: Arc<dyn ClientRegistry>,
) -> Result<AuthComponents, ConfigError> {
    let signer = Signer::new(jwt)?;
    let engine = RotationEngine::new(
        signer.clone(),
        store,
        identity.clone(),
        Duration::days(jwt.refresh_token_expiry_days),
    );
    let service = AuthService::new(engine, identity.clone(), clients);
    let auth: Arc<dyn AuthApi> = Arc::new(Traced::new(Validated::new(service)));

    Ok(AuthComponents {
        signer,
        auth,
        identity,
    })
}

fn json_error_handler(err: error::JsonPayloadError, _req: &actix_web::HttpRequest) -> error::Error {
    let body = AuthResult::<()>::invalid(vec![err.to_string()]);
    error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
}

pub fn run(listener: TcpListener, components: AuthComponents) -> Result<Server, std::io::Error> {
    let auth = web::Data::from(components.auth);
    let identity = web::Data::from(components.identity);
    let signer = components.signer;

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(auth.clone())
            .app_data(identity.clone())
            .route("/health_check", web::get().to(health_check))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            // Protected routes (require a valid access token)
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(signer.clone()))
                    .route("/me", web::get().to(get_current_user))
                    .route("/logout", web::post().to(logout))
                    .route("/logout-all", web::post().to(logout_all)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

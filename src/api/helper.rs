use crate::errors::AppError;
use tracing::log::{debug, error};

/// Runs one synchronous diesel closure on a pooled connection, folding pool,
/// interact and query failures into `AppError`.
///
/// Diesel errors are left at debug level here: callers map the expected ones
/// (NotFound, unique/foreign-key violations) to 4xx responses, and anything
/// that reaches the response layer as a 500 is logged there with detail.
pub(super) async fn run_query<T, F>(
    pool: &deadpool_diesel::postgres::Pool,
    query: F,
) -> Result<T, AppError>
where
    F: FnOnce(&mut diesel::PgConnection) -> Result<T, diesel::result::Error> + Send + 'static,
    T: Send + 'static,
{
    let conn = pool.get().await.inspect_err(|pool_err| {
        error!("Failed to check out a pooled connection: {:?}", pool_err);
    })?;

    match conn.interact(query).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(diesel_err)) => {
            debug!("Query returned a diesel error: {:?}", diesel_err);
            Err(AppError::DieselError(diesel_err))
        }
        Err(interact_err) => {
            error!("Connection interaction failed: {:?}", interact_err);
            Err(AppError::InteractError(interact_err))
        }
    }
}

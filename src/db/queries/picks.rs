use sqlx::{Error, PgExecutor};
use uuid::Uuid;

use crate::db::models::picks::{NewPickModel, PickModel};

/// Insert a pick. Duplicate tickers within a batch violate `picks_batch_ticker_unique`.
pub async fn insert_pick<'e, E>(executor: E, pick: &NewPickModel) -> Result<(), Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO picks (id, batch_id, ticker, action, reasoning, initial_price)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(pick.id)
    .bind(pick.batch_id)
    .bind(&pick.ticker)
    .bind(pick.action.as_str())
    .bind(&pick.reasoning)
    .bind(pick.initial_price)
    .execute(executor)
    .await?;

    Ok(())
}

/// All picks of a batch in ticker order
pub async fn get_picks_for_batch<'e, E>(executor: E, batch_id: Uuid) -> Result<Vec<PickModel>, Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, PickModel>(
        r#"
        SELECT id, batch_id, ticker, action, reasoning, initial_price, created_at
        FROM picks
        WHERE batch_id = $1
        ORDER BY ticker
        "#,
    )
    .bind(batch_id)
    .fetch_all(executor)
    .await
}

pub async fn get_pick_ids_for_batch<'e, E>(executor: E, batch_id: Uuid) -> Result<Vec<Uuid>, Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM picks WHERE batch_id = $1")
        .bind(batch_id)
        .fetch_all(executor)
        .await
}

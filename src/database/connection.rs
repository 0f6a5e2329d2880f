use mongodb::bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{Client, Database, IndexModel};

use crate::errors::Result;
use crate::models::game::Game;
use crate::models::rating::Rating;
use crate::models::user::User;

/// Connects to MongoDB and returns the application database. The database
/// name comes from the URI path, falling back to "pickuppro".
pub async fn connect(uri: &str) -> Result<Database> {
    let client = Client::with_uri_str(uri).await?;
    let db = client
        .default_database()
        .unwrap_or_else(|| client.database("pickuppro"));

    match db.list_collection_names().await {
        Ok(collections) => {
            tracing::info!("✅ Connected to database: {}", db.name());
            tracing::info!("📂 Collections found: {:?}", collections);
        }
        Err(e) => {
            tracing::warn!("Database '{}' may be inaccessible: {}", db.name(), e);
        }
    }

    ensure_indexes(&db).await?;

    Ok(db)
}

/// Creates the index set the API relies on. The unique index on
/// (fromUserId, toUserId, gameId) backstops the one-rating-per-player-per-game
/// rule against concurrent submissions.
async fn ensure_indexes(db: &Database) -> Result<()> {
    let unique = IndexOptions::builder().unique(true).build();

    let users = db.collection::<User>("users");
    users
        .create_index(
            IndexModel::builder()
                .keys(doc! { "email": 1 })
                .options(unique.clone())
                .build(),
        )
        .await?;
    users
        .create_index(IndexModel::builder().keys(doc! { "sports": 1 }).build())
        .await?;
    users
        .create_index(IndexModel::builder().keys(doc! { "name": "text" }).build())
        .await?;

    let games = db.collection::<Game>("games");
    for keys in [
        doc! { "hostId": 1 },
        doc! { "sport": 1 },
        doc! { "date": 1 },
        doc! { "status": 1 },
        doc! { "sport": 1, "date": 1, "status": 1 },
        doc! { "location.city": "text" },
    ] {
        games
            .create_index(IndexModel::builder().keys(keys).build())
            .await?;
    }

    let ratings = db.collection::<Rating>("ratings");
    ratings
        .create_index(IndexModel::builder().keys(doc! { "gameId": 1 }).build())
        .await?;
    ratings
        .create_index(IndexModel::builder().keys(doc! { "toUserId": 1 }).build())
        .await?;
    ratings
        .create_index(
            IndexModel::builder()
                .keys(doc! { "fromUserId": 1, "toUserId": 1, "gameId": 1 })
                .options(unique)
                .build(),
        )
        .await?;

    tracing::info!("✅ Database indexes created");
    Ok(())
}

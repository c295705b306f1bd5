//! Runs a few statements against a live Data API endpoint.
//!
//! ```text
//! DATA_API_ENDPOINT=https://rds-data.us-east-1.amazonaws.com \
//! DATA_API_AUTHORIZATION="<signed authorization>" \
//! DATA_API_RESOURCE_ARN=arn:aws:rds:... \
//! DATA_API_SECRET_ARN=arn:aws:secretsmanager:... \
//! DATA_API_DATABASE=test \
//! cargo run --example basic
//! ```

use rds_data_api::{DataApi, DataApiError, Params};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let api = DataApi::from_env()?;

    api.execute(
        "CREATE TABLE IF NOT EXISTS pets (id INT AUTO_INCREMENT PRIMARY KEY, name VARCHAR(64))",
        (),
        false,
    )
    .await?;

    let inserted = api
        .execute(
            "INSERT INTO pets (name) VALUES (:name)",
            vec![
                Params::new().bind("name", "dog"),
                Params::new().bind("name", "cat"),
            ],
            false,
        )
        .await?;
    println!("generated keys: {:?}", inserted.generated_keys());

    api.transaction(|tx| {
        Box::pin(async move {
            tx.execute(
                "UPDATE pets SET name = :name WHERE name = 'cat'",
                Params::new().bind("name", "lion"),
                false,
            )
            .await?;
            Ok::<_, DataApiError>(())
        })
    })
    .await?;

    let pets = api.execute("SELECT id, name FROM pets", (), true).await?;
    for record in &pets {
        println!("{record}");
    }
    Ok(())
}

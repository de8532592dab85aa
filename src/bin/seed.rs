use chrono::{Duration, Utc};
use crew_meals_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    models::Role,
    services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&pool).await?;

    let admin_id = ensure_user(&pool, "admin@example.com", "admin123", Role::Admin).await?;
    let producer_id =
        ensure_user(&pool, "producer@example.com", "producer123", Role::Producer).await?;
    let crew_id = ensure_user(&pool, "crew@example.com", "crew123", Role::Regular).await?;
    let project_id = seed_project(&pool, "Desert Unit Day 1").await?;
    ensure_member(&pool, project_id, crew_id, Role::Regular).await?;

    println!(
        "Seed completed. Admin ID: {admin_id}, Producer ID: {producer_id}, Crew ID: {crew_id}, Project ID: {project_id}"
    );
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: Role,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(role.as_str())
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={})", role.as_str());
    Ok(user_id)
}

async fn seed_project(pool: &sqlx::PgPool, name: &str) -> anyhow::Result<Uuid> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM projects WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    // Window opens shortly after seeding so the flow can be tried right away.
    let start_date = Utc::now() + Duration::minutes(5);
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO projects (id, name, location, start_date, order_window_minutes)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind("Stage 4")
    .bind(start_date)
    .bind(60_i32)
    .fetch_one(pool)
    .await?;

    println!("Seeded project {name}");
    Ok(id)
}

async fn ensure_member(
    pool: &sqlx::PgPool,
    project_id: Uuid,
    user_id: Uuid,
    role: Role,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO project_members (project_id, user_id, role)
        VALUES ($1, $2, $3)
        ON CONFLICT (project_id, user_id) DO UPDATE SET is_active = TRUE
        "#,
    )
    .bind(project_id)
    .bind(user_id)
    .bind(role.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

#[macro_use]
extern crate rocket;

mod auth;
mod db;
mod errors;
mod models;
mod money;

use std::path::PathBuf;

use auth::AuthUser;
use chrono::NaiveDate;
use db::DbPool;
use errors::ApiError;
use models::TransactionType;
use money::MajorAmount;
use rocket::fs::FileServer;
use rocket::serde::json::Json;
use rocket::{Build, Rocket, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct ProfileUpdate {
    username: String,
    #[serde(rename = "newPassword")]
    new_password: Option<String>,
}

#[derive(Deserialize)]
struct NewAccount {
    name: String,
    bank_name: Option<String>,
    initial_balance: Option<MajorAmount>,
}

#[derive(Deserialize)]
struct NewTransaction {
    account_id: i64,
    description: String,
    amount: i64,
    #[serde(rename = "type")]
    kind: TransactionType,
    category: Option<String>,
    date: NaiveDate,
}

#[derive(Deserialize)]
struct NewCategory {
    name: String,
    #[serde(rename = "type")]
    kind: TransactionType,
}

#[derive(Serialize)]
struct Data<T> {
    data: T,
}

// --- auth ---

#[post("/register", format = "json", data = "<body>")]
fn register(pool: &State<DbPool>, body: Json<Credentials>) -> Result<Json<Value>, ApiError> {
    let body = body.into_inner();
    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        return Err(ApiError::BadRequest("Informe usuário e senha.".into()));
    }

    let hash = auth::hash_password(&body.password)?;
    let conn = pool.get()?;
    let user_id = db::insert_user(&conn, username, &hash, &auth::now_rfc3339())
        .map_err(|err| ApiError::on_conflict(err, "Usuário já existe."))?;
    db::seed_default_categories(&conn, user_id)?;

    Ok(Json(json!({ "message": "Criado!" })))
}

#[post("/login", format = "json", data = "<body>")]
fn login(pool: &State<DbPool>, body: Json<Credentials>) -> Result<Json<Value>, ApiError> {
    let body = body.into_inner();
    let conn = pool.get()?;

    let Some((user_id, hash)) = db::user_credentials(&conn, body.username.trim())? else {
        return Err(ApiError::BadRequest("Usuário não encontrado.".into()));
    };
    if !auth::verify_password(&hash, &body.password) {
        return Err(ApiError::Unauthorized("Senha incorreta.".into()));
    }

    let now = auth::now_rfc3339();
    db::delete_expired_sessions(&conn, user_id, &now)?;
    let token = Uuid::new_v4().to_string();
    db::create_session(&conn, user_id, &token, &now, &auth::session_expiry())?;

    Ok(Json(json!({ "token": token, "username": body.username.trim() })))
}

// --- profile ---

#[get("/user")]
fn get_user(pool: &State<DbPool>, user: AuthUser) -> Result<Json<models::User>, ApiError> {
    let conn = pool.get()?;
    db::user_by_id(&conn, user.id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Usuário não encontrado.".into()))
}

#[put("/user", format = "json", data = "<body>")]
fn update_user(
    pool: &State<DbPool>,
    user: AuthUser,
    body: Json<ProfileUpdate>,
) -> Result<Json<Value>, ApiError> {
    let body = body.into_inner();
    let hash = match body.new_password.as_deref() {
        Some(password) if !password.is_empty() => Some(auth::hash_password(password)?),
        _ => None,
    };

    let conn = pool.get()?;
    db::update_user(&conn, user.id, body.username.trim(), hash.as_deref())
        .map_err(|err| ApiError::on_conflict(err, "Usuário já existe."))?;

    Ok(Json(json!({ "message": "Atualizado!" })))
}

#[delete("/user")]
fn delete_user(pool: &State<DbPool>, user: AuthUser) -> Result<Json<Value>, ApiError> {
    let conn = pool.get()?;
    db::delete_user(&conn, user.id)?;
    Ok(Json(json!({ "message": "Conta excluída." })))
}

// --- accounts ---

#[get("/accounts")]
fn list_accounts(
    pool: &State<DbPool>,
    user: AuthUser,
) -> Result<Json<Data<Vec<models::AccountSummary>>>, ApiError> {
    let conn = pool.get()?;
    let data = db::list_accounts(&conn, user.id)?;
    Ok(Json(Data { data }))
}

#[post("/accounts", format = "json", data = "<body>")]
fn create_account(
    pool: &State<DbPool>,
    user: AuthUser,
    body: Json<NewAccount>,
) -> Result<Json<Value>, ApiError> {
    let body = body.into_inner();
    let cents = match &body.initial_balance {
        None => 0,
        Some(amount) => amount
            .to_cents()
            .ok_or_else(|| ApiError::BadRequest("Valor inválido.".into()))?,
    };

    let conn = pool.get()?;
    let id = db::insert_account(&conn, user.id, body.name.trim(), body.bank_name.as_deref(), cents)?;
    Ok(Json(json!({ "id": id })))
}

// --- transactions ---

#[get("/transactions?<month>&<category>")]
fn list_transactions(
    pool: &State<DbPool>,
    user: AuthUser,
    month: Option<String>,
    category: Option<String>,
) -> Result<Json<Data<Vec<models::TransactionRecord>>>, ApiError> {
    // "Todas" is the frontend's all-categories sentinel.
    let category = category
        .as_deref()
        .filter(|value| !value.is_empty() && *value != "Todas");
    let month = month.as_deref().filter(|value| !value.is_empty());

    let conn = pool.get()?;
    let data = db::list_transactions(&conn, user.id, month, category)?;
    Ok(Json(Data { data }))
}

#[post("/transactions", format = "json", data = "<body>")]
fn create_transaction(
    pool: &State<DbPool>,
    user: AuthUser,
    body: Json<NewTransaction>,
) -> Result<Json<Value>, ApiError> {
    let body = body.into_inner();
    if body.amount < 0 {
        return Err(ApiError::BadRequest("Valor inválido.".into()));
    }

    let conn = pool.get()?;
    if !db::account_belongs_to(&conn, body.account_id, user.id)? {
        return Err(ApiError::Forbidden("Conta inválida".into()));
    }

    let category = body
        .category
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("Outros");
    let id = db::insert_transaction(
        &conn,
        body.account_id,
        &body.description,
        body.amount,
        body.kind.as_str(),
        category,
        body.date,
    )?;
    Ok(Json(json!({ "id": id })))
}

#[get("/global-balance")]
fn global_balance(pool: &State<DbPool>, user: AuthUser) -> Result<Json<Value>, ApiError> {
    let conn = pool.get()?;
    let total = db::global_balance(&conn, user.id)?;
    Ok(Json(json!({ "total": total })))
}

// --- categories ---

#[get("/categories")]
fn list_categories(
    pool: &State<DbPool>,
    user: AuthUser,
) -> Result<Json<Data<Vec<models::Category>>>, ApiError> {
    let conn = pool.get()?;
    let data = db::list_categories(&conn, user.id)?;
    Ok(Json(Data { data }))
}

#[post("/categories", format = "json", data = "<body>")]
fn create_category(
    pool: &State<DbPool>,
    user: AuthUser,
    body: Json<NewCategory>,
) -> Result<Json<Value>, ApiError> {
    let body = body.into_inner();
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Informe o nome da categoria.".into()));
    }

    let conn = pool.get()?;
    let id = db::insert_category(&conn, user.id, name, body.kind.as_str())?;
    Ok(Json(json!({ "id": id })))
}

#[delete("/categories/<id>")]
fn delete_category(pool: &State<DbPool>, user: AuthUser, id: i64) -> Result<Json<Value>, ApiError> {
    let conn = pool.get()?;
    db::delete_category(&conn, user.id, id)?;
    Ok(Json(json!({ "message": "Deletado" })))
}

// --- reports ---

#[get("/reports/category")]
fn report_category(
    pool: &State<DbPool>,
    user: AuthUser,
) -> Result<Json<Data<Vec<models::CategoryTotal>>>, ApiError> {
    let conn = pool.get()?;
    let data = db::category_report(&conn, user.id)?;
    Ok(Json(Data { data }))
}

#[get("/reports/monthly")]
fn report_monthly(
    pool: &State<DbPool>,
    user: AuthUser,
) -> Result<Json<Data<Vec<models::MonthlyTotal>>>, ApiError> {
    let conn = pool.get()?;
    let data = db::monthly_report(&conn, user.id)?;
    Ok(Json(Data { data }))
}

// --- catchers ---

#[catch(400)]
fn bad_request() -> Json<Value> {
    Json(json!({ "error": "Requisição inválida." }))
}

#[catch(401)]
fn unauthorized() -> Json<Value> {
    Json(json!({ "error": "Token ausente." }))
}

#[catch(403)]
fn forbidden() -> Json<Value> {
    Json(json!({ "error": "Acesso negado." }))
}

#[catch(404)]
fn not_found() -> Json<Value> {
    Json(json!({ "error": "Recurso não encontrado." }))
}

#[catch(422)]
fn unprocessable() -> Json<Value> {
    Json(json!({ "error": "Dados inválidos." }))
}

#[catch(500)]
fn internal_error() -> Json<Value> {
    Json(json!({ "error": "Erro interno" }))
}

fn build_rocket(pool: DbPool) -> Rocket<Build> {
    rocket::build()
        .manage(pool)
        .mount("/auth", routes![register, login])
        .mount(
            "/api",
            routes![
                get_user,
                update_user,
                delete_user,
                list_accounts,
                create_account,
                list_transactions,
                create_transaction,
                global_balance,
                list_categories,
                create_category,
                delete_category,
                report_category,
                report_monthly,
            ],
        )
        .mount("/", FileServer::from("static"))
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                unprocessable,
                internal_error,
            ],
        )
}

#[launch]
fn rocket() -> _ {
    let db_path = std::env::var("FINTRACK_DB").unwrap_or_else(|_| "data/fintrack.sqlite".into());
    let db_path = PathBuf::from(db_path);
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir).expect("create data directory");
    }
    let pool = db::init_db(&db_path);
    build_rocket(pool)
}

#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::blocking::{Client, LocalResponse};

    use super::*;

    fn client() -> Client {
        Client::tracked(build_rocket(db::init_test_db())).expect("rocket client")
    }

    fn register<'c>(client: &'c Client, username: &str) -> LocalResponse<'c> {
        client
            .post("/auth/register")
            .header(ContentType::JSON)
            .body(json!({ "username": username, "password": "segredo1" }).to_string())
            .dispatch()
    }

    fn login(client: &Client, username: &str) -> String {
        let res = client
            .post("/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "username": username, "password": "segredo1" }).to_string())
            .dispatch();
        assert_eq!(res.status(), Status::Ok);
        let body: Value = res.into_json().expect("login body");
        body["token"].as_str().expect("token").to_string()
    }

    fn signup(client: &Client, username: &str) -> String {
        assert_eq!(register(client, username).status(), Status::Ok);
        login(client, username)
    }

    fn bearer(token: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {token}"))
    }

    fn create_account(client: &Client, token: &str, body: Value) -> i64 {
        let res = client
            .post("/api/accounts")
            .header(ContentType::JSON)
            .header(bearer(token))
            .body(body.to_string())
            .dispatch();
        assert_eq!(res.status(), Status::Ok);
        let body: Value = res.into_json().expect("account body");
        body["id"].as_i64().expect("account id")
    }

    fn create_transaction<'c>(client: &'c Client, token: &str, body: Value) -> LocalResponse<'c> {
        client
            .post("/api/transactions")
            .header(ContentType::JSON)
            .header(bearer(token))
            .body(body.to_string())
            .dispatch()
    }

    fn get_json(client: &Client, token: &str, path: &str) -> Value {
        let res = client.get(path).header(bearer(token)).dispatch();
        assert_eq!(res.status(), Status::Ok);
        res.into_json().expect("json body")
    }

    #[test]
    fn register_rejects_duplicate_username() {
        let client = client();
        assert_eq!(register(&client, "ana").status(), Status::Ok);

        let res = register(&client, "ana");
        assert_eq!(res.status(), Status::BadRequest);
        let body: Value = res.into_json().unwrap();
        assert_eq!(body["error"], "Usuário já existe.");
    }

    #[test]
    fn login_distinguishes_unknown_user_from_wrong_password() {
        let client = client();
        assert_eq!(register(&client, "ana").status(), Status::Ok);

        let res = client
            .post("/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "username": "bia", "password": "segredo1" }).to_string())
            .dispatch();
        assert_eq!(res.status(), Status::BadRequest);

        let res = client
            .post("/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "username": "ana", "password": "errada" }).to_string())
            .dispatch();
        assert_eq!(res.status(), Status::Unauthorized);
    }

    #[test]
    fn api_requires_a_valid_bearer_token() {
        let client = client();

        let res = client.get("/api/accounts").dispatch();
        assert_eq!(res.status(), Status::Unauthorized);

        let res = client
            .get("/api/accounts")
            .header(bearer("nao-existe"))
            .dispatch();
        assert_eq!(res.status(), Status::Forbidden);
        let body: Value = res.into_json().unwrap();
        assert_eq!(body["error"], "Acesso negado.");
    }

    #[test]
    fn account_creation_converts_major_units_to_cents() {
        let client = client();
        let token = signup(&client, "ana");

        create_account(
            &client,
            &token,
            json!({ "name": "Carteira", "bank_name": "Banco X", "initial_balance": "10,50" }),
        );
        create_account(&client, &token, json!({ "name": "Poupança", "initial_balance": 10.5 }));

        let body = get_json(&client, &token, "/api/accounts");
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["current_balance"], 1050);
        assert_eq!(data[0]["bank_name"], "Banco X");
        assert_eq!(data[1]["current_balance"], 1050);

        let res = client
            .post("/api/accounts")
            .header(ContentType::JSON)
            .header(bearer(&token))
            .body(json!({ "name": "Quebrada", "initial_balance": "dez" }).to_string())
            .dispatch();
        assert_eq!(res.status(), Status::BadRequest);
    }

    #[test]
    fn registration_seeds_default_categories() {
        let client = client();
        let token = signup(&client, "ana");

        let body = get_json(&client, &token, "/api/categories");
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), db::DEFAULT_CATEGORIES.len());
        let names: Vec<&str> = data.iter().map(|c| c["name"].as_str().unwrap()).collect();
        assert!(names.contains(&"Outros"));
        assert!(names.contains(&"Salário"));
    }

    #[test]
    fn balance_and_reports_follow_the_reference_scenario() {
        let client = client();
        let token = signup(&client, "ana");
        let account = create_account(
            &client,
            &token,
            json!({ "name": "Corrente", "initial_balance": 0 }),
        );

        let res = create_transaction(
            &client,
            &token,
            json!({
                "account_id": account,
                "description": "salário",
                "amount": 500,
                "type": "INCOME",
                "category": "Salário",
                "date": "2024-01-05"
            }),
        );
        assert_eq!(res.status(), Status::Ok);
        let res = create_transaction(
            &client,
            &token,
            json!({
                "account_id": account,
                "description": "feira",
                "amount": 200,
                "type": "EXPENSE",
                "category": "Mercado",
                "date": "2024-01-10"
            }),
        );
        assert_eq!(res.status(), Status::Ok);

        let accounts = get_json(&client, &token, "/api/accounts");
        assert_eq!(accounts["data"][0]["current_balance"], 300);

        let total = get_json(&client, &token, "/api/global-balance");
        assert_eq!(total["total"], 300);

        let monthly = get_json(&client, &token, "/api/reports/monthly");
        assert_eq!(
            monthly["data"],
            json!([{ "month": "2024-01", "income": 500, "expense": 200 }])
        );

        let by_category = get_json(&client, &token, "/api/reports/category");
        assert_eq!(
            by_category["data"],
            json!([{ "category": "Mercado", "total": 200 }])
        );
    }

    #[test]
    fn cross_user_transaction_is_rejected_without_a_write() {
        let client = client();
        let token_ana = signup(&client, "ana");
        let token_bia = signup(&client, "bia");
        let account_ana = create_account(
            &client,
            &token_ana,
            json!({ "name": "Corrente", "initial_balance": 0 }),
        );

        let res = create_transaction(
            &client,
            &token_bia,
            json!({
                "account_id": account_ana,
                "description": "invasão",
                "amount": 100,
                "type": "EXPENSE",
                "category": "Outros",
                "date": "2024-01-10"
            }),
        );
        assert_eq!(res.status(), Status::Forbidden);
        let body: Value = res.into_json().unwrap();
        assert_eq!(body["error"], "Conta inválida");

        let ana_rows = get_json(&client, &token_ana, "/api/transactions");
        assert!(ana_rows["data"].as_array().unwrap().is_empty());
    }

    #[test]
    fn transaction_filters_respect_month_category_and_sentinel() {
        let client = client();
        let token = signup(&client, "ana");
        let account = create_account(
            &client,
            &token,
            json!({ "name": "Corrente", "initial_balance": 0 }),
        );
        for (desc, category, date) in [
            ("feira", "Mercado", "2024-01-10"),
            ("cinema", "Lazer", "2024-01-20"),
            ("feira", "Mercado", "2024-02-03"),
        ] {
            let res = create_transaction(
                &client,
                &token,
                json!({
                    "account_id": account,
                    "description": desc,
                    "amount": 100,
                    "type": "EXPENSE",
                    "category": category,
                    "date": date
                }),
            );
            assert_eq!(res.status(), Status::Ok);
        }

        let january = get_json(&client, &token, "/api/transactions?month=2024-01");
        assert_eq!(january["data"].as_array().unwrap().len(), 2);

        let market = get_json(&client, &token, "/api/transactions?category=Mercado");
        assert_eq!(market["data"].as_array().unwrap().len(), 2);

        let all = get_json(&client, &token, "/api/transactions?category=Todas");
        assert_eq!(all["data"].as_array().unwrap().len(), 3);

        let narrowed = get_json(
            &client,
            &token,
            "/api/transactions?month=2024-01&category=Mercado",
        );
        let rows = narrowed["data"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["account_name"], "Corrente");
    }

    #[test]
    fn deleting_a_category_keeps_existing_transaction_labels() {
        let client = client();
        let token = signup(&client, "ana");
        let account = create_account(
            &client,
            &token,
            json!({ "name": "Corrente", "initial_balance": 0 }),
        );

        let res = client
            .post("/api/categories")
            .header(ContentType::JSON)
            .header(bearer(&token))
            .body(json!({ "name": "Viagem", "type": "EXPENSE" }).to_string())
            .dispatch();
        assert_eq!(res.status(), Status::Ok);
        let created: Value = res.into_json().unwrap();
        let category_id = created["id"].as_i64().unwrap();

        let res = create_transaction(
            &client,
            &token,
            json!({
                "account_id": account,
                "description": "passagem",
                "amount": 900,
                "type": "EXPENSE",
                "category": "Viagem",
                "date": "2024-04-01"
            }),
        );
        assert_eq!(res.status(), Status::Ok);

        let res = client
            .delete(format!("/api/categories/{category_id}"))
            .header(bearer(&token))
            .dispatch();
        assert_eq!(res.status(), Status::Ok);

        let rows = get_json(&client, &token, "/api/transactions");
        assert_eq!(rows["data"][0]["category"], "Viagem");
    }

    #[test]
    fn missing_category_defaults_to_outros() {
        let client = client();
        let token = signup(&client, "ana");
        let account = create_account(
            &client,
            &token,
            json!({ "name": "Corrente", "initial_balance": 0 }),
        );

        let res = create_transaction(
            &client,
            &token,
            json!({
                "account_id": account,
                "description": "avulso",
                "amount": 40,
                "type": "EXPENSE",
                "date": "2024-04-01"
            }),
        );
        assert_eq!(res.status(), Status::Ok);

        let rows = get_json(&client, &token, "/api/transactions");
        assert_eq!(rows["data"][0]["category"], "Outros");
    }

    #[test]
    fn profile_update_rehashes_password() {
        let client = client();
        let token = signup(&client, "ana");

        let res = client
            .put("/api/user")
            .header(ContentType::JSON)
            .header(bearer(&token))
            .body(json!({ "username": "ana", "newPassword": "novosegredo" }).to_string())
            .dispatch();
        assert_eq!(res.status(), Status::Ok);

        let res = client
            .post("/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "username": "ana", "password": "novosegredo" }).to_string())
            .dispatch();
        assert_eq!(res.status(), Status::Ok);
    }

    #[test]
    fn account_deletion_invalidates_the_token() {
        let client = client();
        let token = signup(&client, "ana");

        let res = client.delete("/api/user").header(bearer(&token)).dispatch();
        assert_eq!(res.status(), Status::Ok);

        let res = client.get("/api/accounts").header(bearer(&token)).dispatch();
        assert_eq!(res.status(), Status::Forbidden);
    }
}

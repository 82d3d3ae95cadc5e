//! REST API under `/api/v1`

pub mod auth;
pub mod bookings;
pub mod reviews;
pub mod tours;
pub mod users;

use axum::{middleware, Router};

use crate::middleware::ApiRateLimit;
use crate::state::AppState;

/// All resource routers, rate limited per client
pub fn router(state: &AppState) -> Router<AppState> {
    let limit = ApiRateLimit::new(&state.config().rate_limit);

    let v1 = Router::new()
        .nest("/tours", tours::router(state))
        .nest("/users", users::router(state))
        .nest("/reviews", reviews::router(state))
        .nest("/bookings", bookings::router(state));

    Router::new()
        .nest("/api/v1", v1)
        .route_layer(middleware::from_fn_with_state(limit, ApiRateLimit::middleware))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::entities::{tests::create_user, tests::tour_input, Role, TOUR};
    use crate::server::app;
    use crate::services::email::testing::RecordingMailer;
    use crate::services::payments::testing::FixedGateway;
    use crate::services::Mailer;
    use crate::state::{testing, AppState};

    struct Client {
        app: Router,
        state: AppState,
    }

    impl Client {
        async fn new() -> Self {
            Self::from_state(testing::state().await)
        }

        fn from_state(state: AppState) -> Self {
            Self {
                app: app(state.clone()),
                state,
            }
        }

        async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let body = match body {
                Some(body) => {
                    request = request.header(header::CONTENT_TYPE, "application/json");
                    Body::from(body.to_string())
                }
                None => Body::empty(),
            };
            self.app.clone().oneshot(request.body(body).unwrap()).await.unwrap()
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let response = self.send(method, uri, token, body).await;
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, body)
        }

        async fn login_as(&self, email: &str, role: Role) -> (String, String) {
            let user = create_user(self.state.db(), email, role).await;
            let id = user["_id"].as_str().unwrap().to_string();
            let token = self.state.jwt().issue(&id).unwrap();
            (id, token)
        }

        async fn create_tour(&self, token: &str, name: &str, price: f64) -> String {
            let (status, body) = self
                .call(
                    Method::POST,
                    "/api/v1/tours",
                    Some(token),
                    Some(Value::Object(tour_input(name, price))),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{}", body);
            body["data"]["data"]["_id"].as_str().unwrap().to_string()
        }
    }

    fn signup_body(email: &str) -> Value {
        json!({
            "name": "Ann Smith",
            "email": email,
            "password": "pass1234",
            "passwordConfirm": "pass1234",
            "role": "admin",
        })
    }

    #[tokio::test]
    async fn test_signup_issues_token_and_cookie() {
        let mailer = Arc::new(RecordingMailer::default());
        let client = Client::from_state(testing::state_with(mailer.clone(), None).await);

        let response = client
            .send(Method::POST, "/api/v1/users/signup", None, Some(signup_body("ann@example.com")))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("jwt="));
        assert!(cookie.contains("HttpOnly"));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "success");
        assert!(body["token"].is_string());
        let user = &body["data"]["user"];
        assert_eq!(user["email"], "ann@example.com");
        assert_eq!(user["role"], "user");
        assert!(user.get("password").is_none());
        assert!(user.get("passwordConfirm").is_none());

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ann@example.com");
    }

    #[tokio::test]
    async fn test_signup_rejects_duplicate_email() {
        let client = Client::new().await;
        client
            .call(Method::POST, "/api/v1/users/signup", None, Some(signup_body("ann@example.com")))
            .await;
        let (status, body) = client
            .call(Method::POST, "/api/v1/users/signup", None, Some(signup_body("ann@example.com")))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("Duplicate field value"));
    }

    #[tokio::test]
    async fn test_login() {
        let client = Client::new().await;
        create_user(client.state.db(), "ann@example.com", Role::User).await;

        let (status, body) = client
            .call(Method::POST, "/api/v1/users/login", None, Some(json!({"email": "ann@example.com"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Please provide email and password");

        let (status, body) = client
            .call(
                Method::POST,
                "/api/v1/users/login",
                None,
                Some(json!({"email": "ann@example.com", "password": "wrong-pass"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Incorrect email or password");

        let (status, body) = client
            .call(
                Method::POST,
                "/api/v1/users/login",
                None,
                Some(json!({"email": "ann@example.com", "password": "pass1234"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap();
        assert!(body["data"]["user"].get("password").is_none());

        let (status, body) = client.call(Method::GET, "/api/v1/users/me", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["data"]["email"], "ann@example.com");
    }

    #[tokio::test]
    async fn test_protect_rejections() {
        let client = Client::new().await;

        let (status, body) = client.call(Method::GET, "/api/v1/users/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "You are not logged in! Please log in to get access.");

        let (status, body) = client
            .call(Method::GET, "/api/v1/users/me", Some("not.a.token"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid token. Please log in again!");

        let ghost = client.state.jwt().issue("0123456789abcdef0123456789abcdef").unwrap();
        let (status, body) = client.call(Method::GET, "/api/v1/users/me", Some(&ghost), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "The user belonging to this token does no longer exist.");
    }

    #[tokio::test]
    async fn test_token_from_cookie() {
        let client = Client::new().await;
        let (_, token) = client.login_as("ann@example.com", Role::User).await;
        let request = Request::builder()
            .uri("/api/v1/users/me")
            .header(header::COOKIE, format!("theme=dark; jwt={}", token))
            .body(Body::empty())
            .unwrap();
        let response = client.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder()
            .uri("/api/v1/users/me")
            .header(header::COOKIE, "jwt=loggedout")
            .body(Body::empty())
            .unwrap();
        let response = client.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_overwrites_cookie() {
        let client = Client::new().await;
        let response = client.send(Method::GET, "/api/v1/users/logout", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("jwt=loggedout;"));
        assert!(cookie.contains("Max-Age=10"));
    }

    #[tokio::test]
    async fn test_roles_are_enforced() {
        let client = Client::new().await;
        let (_, user) = client.login_as("ann@example.com", Role::User).await;
        let (_, admin) = client.login_as("root@example.com", Role::Admin).await;

        let (status, body) = client
            .call(
                Method::POST,
                "/api/v1/tours",
                Some(&user),
                Some(Value::Object(tour_input("The Forest Hiker", 397.0))),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "You do not have permission to perform this action");

        let (status, _) = client.call(Method::GET, "/api/v1/users", Some(&user), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = client.call(Method::GET, "/api/v1/users", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"], 2);

        let (status, body) = client
            .call(Method::POST, "/api/v1/users", Some(&admin), Some(json!({"name": "x"})))
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "This route is not defined! Please use /signup instead");
    }

    #[tokio::test]
    async fn test_monthly_plan_requires_guides() {
        let client = Client::new().await;
        let (_, user) = client.login_as("ann@example.com", Role::User).await;
        let (_, guide) = client.login_as("gus@example.com", Role::Guide).await;

        let (status, _) = client
            .call(Method::GET, "/api/v1/tours/monthly-plan/2021", Some(&user), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = client
            .call(Method::GET, "/api/v1/tours/monthly-plan/2021", Some(&guide), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["plan"], json!([]));
    }

    #[tokio::test]
    async fn test_nested_reviews_update_tour_ratings() {
        let client = Client::new().await;
        let (_, admin) = client.login_as("root@example.com", Role::Admin).await;
        let (ann_id, ann) = client.login_as("ann@example.com", Role::User).await;
        let tour_id = client.create_tour(&admin, "The Forest Hiker", 397.0).await;

        let uri = format!("/api/v1/tours/{}/reviews", tour_id);
        let (status, body) = client
            .call(Method::POST, &uri, Some(&ann), Some(json!({"review": "Loved it", "rating": 4})))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let review = &body["data"]["data"];
        assert_eq!(review["tour"], json!(tour_id));
        assert_eq!(review["user"], json!(ann_id));

        let (status, _) = client
            .call(Method::POST, &uri, Some(&admin), Some(json!({"review": "Meh", "rating": 2})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, body) = client.call(Method::GET, &uri, Some(&ann), None).await;
        assert_eq!(body["results"], 1);
        assert_eq!(body["data"]["data"][0]["user"]["name"], "Test User");

        let (status, body) = client
            .call(Method::GET, &format!("/api/v1/tours/{}", tour_id), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let tour = &body["data"]["data"];
        assert_eq!(tour["ratingsQuantity"], json!(1));
        assert_eq!(tour["ratingsAverage"], json!(4));
        assert_eq!(tour["reviews"].as_array().unwrap().len(), 1);

        let (status, body) = client.call(Method::GET, "/api/v1/reviews", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"], 1);
    }

    #[tokio::test]
    async fn test_reviews_require_login() {
        let client = Client::new().await;
        let (status, _) = client.call(Method::GET, "/api/v1/reviews", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let mailer = Arc::new(RecordingMailer::default());
        let client = Client::from_state(testing::state_with(mailer.clone(), None).await);
        create_user(client.state.db(), "ann@example.com", Role::User).await;

        let (status, body) = client
            .call(
                Method::POST,
                "/api/v1/users/forgotPassword",
                None,
                Some(json!({"email": "nobody@example.com"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "There is no user with this email address");

        let (status, body) = client
            .call(
                Method::POST,
                "/api/v1/users/forgotPassword",
                None,
                Some(json!({"email": "ann@example.com"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Token sent to email!");

        let text = mailer.sent.lock().unwrap()[0].text.clone();
        let start = text.find("resetPassword/").unwrap() + "resetPassword/".len();
        let token: String = text[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();

        let (status, body) = client
            .call(
                Method::PATCH,
                "/api/v1/users/resetPassword/bogus",
                None,
                Some(json!({"password": "newpass123", "passwordConfirm": "newpass123"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Token is invalid or has expired");

        let uri = format!("/api/v1/users/resetPassword/{}", token);
        let (status, body) = client
            .call(
                Method::PATCH,
                &uri,
                None,
                Some(json!({"password": "newpass123", "passwordConfirm": "newpass123"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert!(body["token"].is_string());

        // Tokens are single use
        let (status, _) = client
            .call(
                Method::PATCH,
                &uri,
                None,
                Some(json!({"password": "other1234", "passwordConfirm": "other1234"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = client
            .call(
                Method::POST,
                "/api/v1/users/login",
                None,
                Some(json!({"email": "ann@example.com", "password": "newpass123"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forgot_password_mail_failure() {
        let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer {
            fail: true,
            ..RecordingMailer::default()
        });
        let client = Client::from_state(testing::state_with(mailer, None).await);
        create_user(client.state.db(), "ann@example.com", Role::User).await;

        let (status, body) = client
            .call(
                Method::POST,
                "/api/v1/users/forgotPassword",
                None,
                Some(json!({"email": "ann@example.com"})),
            )
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "There was an error sending the email. Try again later!");
    }

    #[tokio::test]
    async fn test_update_my_password() {
        let client = Client::new().await;
        let (_, token) = client.login_as("ann@example.com", Role::User).await;

        let (status, body) = client
            .call(
                Method::PATCH,
                "/api/v1/users/updateMyPassword",
                Some(&token),
                Some(json!({
                    "passwordCurrent": "wrong-pass",
                    "password": "newpass123",
                    "passwordConfirm": "newpass123",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Your current password is wrong");

        let (status, body) = client
            .call(
                Method::PATCH,
                "/api/v1/users/updateMyPassword",
                Some(&token),
                Some(json!({
                    "passwordCurrent": "pass1234",
                    "password": "newpass123",
                    "passwordConfirm": "different1",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("Invalid input data."));

        let (status, body) = client
            .call(
                Method::PATCH,
                "/api/v1/users/updateMyPassword",
                Some(&token),
                Some(json!({
                    "passwordCurrent": "pass1234",
                    "password": "newpass123",
                    "passwordConfirm": "newpass123",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].is_string());
    }

    #[tokio::test]
    async fn test_update_me_and_delete_me() {
        let client = Client::new().await;
        let (_, token) = client.login_as("ann@example.com", Role::User).await;

        let (status, body) = client
            .call(
                Method::PATCH,
                "/api/v1/users/updateMe",
                Some(&token),
                Some(json!({"password": "newpass123"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "This route is not for password updates. Please use /updateMyPassword."
        );

        let (status, body) = client
            .call(
                Method::PATCH,
                "/api/v1/users/updateMe",
                Some(&token),
                Some(json!({"name": "Ann Jones", "role": "admin"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["name"], "Ann Jones");
        assert_eq!(body["data"]["user"]["role"], "user");

        let response = client
            .send(Method::DELETE, "/api/v1/users/deleteMe", Some(&token), None)
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let (status, body) = client.call(Method::GET, "/api/v1/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "The user belonging to this token does no longer exist.");
    }

    #[tokio::test]
    async fn test_top_five_and_stats() {
        let client = Client::new().await;
        let (_, admin) = client.login_as("root@example.com", Role::Admin).await;
        for (i, price) in [500.0, 300.0, 450.0, 200.0, 900.0, 150.0].into_iter().enumerate() {
            client.create_tour(&admin, &format!("Scenic Tour {}", i), price).await;
        }

        let (status, body) = client.call(Method::GET, "/api/v1/tours/top-5-cheap", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"], 5);
        let tours = body["data"]["data"].as_array().unwrap();
        assert_eq!(tours[0]["price"], json!(150));
        assert!(tours[0].get("duration").is_none());
        assert!(tours[0].get("summary").is_some());

        let (status, body) = client.call(Method::GET, "/api/v1/tours/tour-stats", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let stats = body["data"]["stats"].as_array().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0]["_id"], "EASY");
        assert_eq!(stats[0]["numTours"], json!(6));
        assert_eq!(stats[0]["minPrice"], json!(150));
        assert_eq!(stats[0]["maxPrice"], json!(900));
    }

    #[tokio::test]
    async fn test_geo_routes() {
        let client = Client::new().await;
        let (_, admin) = client.login_as("root@example.com", Role::Admin).await;
        client.create_tour(&admin, "The Sea Explorer", 497.0).await;

        let (status, body) = client
            .call(
                Method::GET,
                "/api/v1/tours/tours-within/50/center/25.7,-80.2/unit/mi",
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"], 1);

        let (_, body) = client
            .call(
                Method::GET,
                "/api/v1/tours/tours-within/50/center/40.7,-74.0/unit/mi",
                None,
                None,
            )
            .await;
        assert_eq!(body["results"], 0);

        let (status, body) = client
            .call(Method::GET, "/api/v1/tours/distances/25.7,-80.2/unit/km", None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let distances = body["data"]["data"].as_array().unwrap();
        assert_eq!(distances.len(), 1);
        assert_eq!(distances[0]["name"], "The Sea Explorer");
        let km = distances[0]["distance"].as_f64().unwrap();
        assert!(km > 0.0 && km < 20.0, "{}", km);
        assert!(distances[0].get("price").is_none());

        let (status, body) = client
            .call(Method::GET, "/api/v1/tours/distances/north/unit/km", None, None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Please provide latitude and longitude in the format lat,lng.");
    }

    #[tokio::test]
    async fn test_checkout_session() {
        let client = Client::new().await;
        let (_, admin) = client.login_as("root@example.com", Role::Admin).await;
        let tour_id = client.create_tour(&admin, "The Forest Hiker", 397.0).await;
        let uri = format!("/api/v1/bookings/checkout-session/{}", tour_id);

        let (status, body) = client.call(Method::GET, &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["message"], "Payments are not available");

        let state = testing::state_with(Arc::new(RecordingMailer::default()), Some(Arc::new(FixedGateway))).await;
        let client = Client::from_state(state);
        let (_, admin) = client.login_as("root@example.com", Role::Admin).await;
        let (_, user) = client.login_as("ann@example.com", Role::User).await;
        let tour_id = client.create_tour(&admin, "The Forest Hiker", 397.0).await;

        let (status, body) = client
            .call(Method::GET, &format!("/api/v1/bookings/checkout-session/{}", tour_id), Some(&user), None)
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["session"]["id"], json!(format!("cs_test_{}", tour_id)));

        let (status, _) = client.call(Method::GET, "/api/v1/bookings", Some(&user), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_booking_crud_for_staff() {
        let client = Client::new().await;
        let (_, admin) = client.login_as("root@example.com", Role::Admin).await;
        let (ann_id, _) = client.login_as("ann@example.com", Role::User).await;
        let tour_id = client.create_tour(&admin, "The Forest Hiker", 397.0).await;

        let (status, body) = client
            .call(
                Method::POST,
                "/api/v1/bookings",
                Some(&admin),
                Some(json!({"tour": tour_id, "user": ann_id, "price": 397})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["data"]["data"]["paid"], json!(true));

        let (status, body) = client.call(Method::GET, "/api/v1/bookings", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["data"][0]["tour"]["name"], "The Forest Hiker");
    }

    #[tokio::test]
    async fn test_secret_tours_are_hidden() {
        let client = Client::new().await;
        let (_, admin) = client.login_as("root@example.com", Role::Admin).await;
        client.create_tour(&admin, "The Forest Hiker", 397.0).await;
        let mut secret = tour_input("The Secret Retreat", 997.0);
        secret.insert("secretTour".into(), json!(true));
        client.state.db().model(TOUR).unwrap().create(secret).await.unwrap();

        let (_, body) = client.call(Method::GET, "/api/v1/tours", None, None).await;
        assert_eq!(body["results"], 1);
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let mut config = testing::config();
        config.rate_limit.max_requests = 2;
        let state = AppState::builder().config(config).build().await.unwrap();
        let client = Client::from_state(state);

        for _ in 0..2 {
            let (status, _) = client.call(Method::GET, "/api/v1/tours", None, None).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, body) = client.call(Method::GET, "/api/v1/tours", None, None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["message"], "Too many requests from this IP, please try again in an hour!");

        // Health probes are not rate limited
        let (status, _) = client.call(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_body_is_sanitized() {
        let client = Client::new().await;
        let (status, body) = client
            .call(
                Method::POST,
                "/api/v1/users/login",
                None,
                Some(json!({"email": {"$gt": ""}, "password": "pass1234"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Please provide email and password");
    }
}

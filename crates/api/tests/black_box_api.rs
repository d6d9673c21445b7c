use reqwest::StatusCode;
use serde_json::{Value, json};

use scholar_api::app::{build_app, services::build_services};
use scholar_infra::{AdminSeed, AppConfig};

const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "admin-password";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let config = AppConfig {
            admin: AdminSeed {
                name: "Admin".to_string(),
                email: ADMIN_EMAIL.to_string(),
                password: ADMIN_PASSWORD.to_string(),
            },
            ..AppConfig::default()
        };

        let services = build_services(&config).await.unwrap();
        let app = build_app(services, &config);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn sign_in(&self, email: &str, password: &str) -> String {
        let res = self
            .client
            .post(self.url("/auth/sign-in"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    async fn sign_up(&self, name: &str, email: &str) -> String {
        let res = self
            .client
            .post(self.url("/auth/sign-up"))
            .json(&json!({ "name": name, "email": email, "password": "student-password" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        self.sign_in(email, "student-password").await
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// A course owned by the admin with `questions` questions, each having a
    /// right and a wrong option.
    async fn course(&self, admin: &str, name: &str, questions: usize) -> String {
        let (_, categories) = self.get(admin, "/courses/categories").await;
        let category_id = categories["data"][0]["id"].as_str().unwrap().to_string();

        let (status, course) = self
            .post(
                admin,
                "/courses",
                json!({ "name": name, "category_id": category_id, "test_duration": 30 }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{course}");
        let course_id = course["id"].as_str().unwrap().to_string();

        for i in 0..questions {
            let (status, question) = self
                .post(
                    admin,
                    &format!("/courses/{course_id}/questions"),
                    json!({ "question": format!("Question {i}") }),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            let question_id = question["id"].as_str().unwrap();
            for (value, is_correct) in [("right", true), ("wrong", false)] {
                let (status, _) = self
                    .post(
                        admin,
                        &format!("/courses/{course_id}/answer-options"),
                        json!({ "question_id": question_id, "value": value, "is_correct": is_correct }),
                    )
                    .await;
                assert_eq!(status, StatusCode::CREATED);
            }
        }
        course_id
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn option_id(question: &Value, value: &str) -> String {
    question["answer_options"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["value"] == value)
        .and_then(|o| o["id"].as_str())
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn().await;
    let res = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let server = TestServer::spawn().await;

    let res = server.client.get(server.url("/courses")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");

    let (status, _) = server.get("not-a-session", "/auth/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
    let server = TestServer::spawn().await;
    let res = server
        .client
        .post(server.url("/auth/sign-in"))
        .json(&json!({ "email": ADMIN_EMAIL, "password": "wrong-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_cookie_authenticates_until_sign_out() {
    let server = TestServer::spawn().await;
    let res = server
        .client
        .post(server.url("/auth/sign-in"))
        .json(&json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let set_cookie = res
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let cookie = set_cookie.split(';').next().unwrap().to_string();
    assert!(cookie.starts_with("session_token="));

    let me = server
        .client
        .get(server.url("/auth/me"))
        .header(reqwest::header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::OK);
    let body: Value = me.json().await.unwrap();
    assert_eq!(body["user"]["email"], ADMIN_EMAIL);
    assert!(body["user"].get("password_hash").is_none());
    assert!(
        body["permissions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|k| k == "write:courses")
    );

    let out = server
        .client
        .post(server.url("/auth/sign-out"))
        .header(reqwest::header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(out.status(), StatusCode::NO_CONTENT);

    let again = server
        .client
        .get(server.url("/auth/me"))
        .header(reqwest::header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn students_cannot_write_courses() {
    let server = TestServer::spawn().await;
    let student = server.sign_up("Sam", "sam@example.com").await;

    let (_, categories) = server.get(&student, "/courses/categories").await;
    let category_id = categories["data"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = server
        .post(
            &student,
            "/courses",
            json!({ "name": "Forbidden Course", "category_id": category_id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (_, courses) = server.get(&student, "/courses").await;
    assert_eq!(courses["total_count"], 0);
}

#[tokio::test]
async fn complete_test_flow_over_http() {
    let server = TestServer::spawn().await;
    let admin = server.sign_in(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let course = server.course(&admin, "HTTP Basics", 2).await;
    let student = server.sign_up("Kim", "kim@example.com").await;

    // Students see the options but not which one is right.
    let (status, questions) = server
        .get(&student, &format!("/courses/{course}/questions"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let questions = questions.as_array().unwrap().clone();
    assert_eq!(questions.len(), 2);
    assert!(questions[0]["answer_options"][0].get("is_correct").is_none());

    let (status, _) = server
        .post(&student, &format!("/courses/{course}/start"), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, enrollment) = server
        .post(&student, &format!("/courses/{course}/join"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(enrollment["started_at"].is_null());

    let (status, _) = server
        .post(&student, &format!("/courses/{course}/join"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = server
        .post(&student, &format!("/courses/{course}/start"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, progress) = server
        .get(&student, &format!("/courses/my-courses/{course}"))
        .await;
    assert_eq!(progress["status"], "started");
    assert!(progress["deadline"].is_string());

    let answer = |q: &Value, value: &str| {
        json!({
            "question_id": q["id"].as_str().unwrap(),
            "answer_id": option_id(q, value),
        })
    };
    for (q, value) in [
        (&questions[0], "wrong"),
        (&questions[0], "right"),
        (&questions[1], "right"),
    ] {
        let (status, body) = server
            .post(&student, &format!("/courses/{course}/answer"), answer(q, value))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let (_, answers) = server
        .get(&student, &format!("/courses/{course}/answers"))
        .await;
    assert_eq!(answers.as_array().unwrap().len(), 2);

    let (status, body) = server
        .get(&student, &format!("/courses/{course}/report"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_state_transition");

    let (status, finished) = server
        .post(&student, &format!("/courses/{course}/finish"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(finished["report"]["score"], 2);
    assert_eq!(finished["report"]["is_passed"], true);
    assert_eq!(finished["enrollment"]["score"], 2);

    let (status, body) = server
        .post(&student, &format!("/courses/{course}/finish"), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_state_transition");

    // The teacher sees the result on the roster.
    let (status, roster) = server
        .get(&admin, &format!("/courses/{course}/students?with_result=true"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(roster["data"][0]["email"], "kim@example.com");
    assert_eq!(roster["data"][0]["is_passed"], true);

    // The roster belongs to teachers only.
    let (status, _) = server
        .get(&student, &format!("/courses/{course}/students"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

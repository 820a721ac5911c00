// tests/exam_api_tests.rs

mod common;

use std::sync::Arc;

use cma_prep::exam::{sourcing::MemoryQuestionBank, store::MemorySessionStore};
use cma_prep::utils::jwt::sign_jwt;
use common::{JWT_SECRET, correct_index, curated_mcqs, spawn_app, spawn_default_app};
use serde_json::{Value, json};

async fn start(client: &reqwest::Client, address: &str, key: &str, body: Value) -> reqwest::Response {
    client
        .post(format!("{}/api/exams/{}/sessions", address, key))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request")
}

/// Answers the first `correct` MCQs correctly and the rest wrongly.
async fn answer_all(client: &reqwest::Client, address: &str, view: &Value, correct: usize) {
    let id = view["id"].as_str().unwrap();
    for (i, mcq) in view["mcqs"].as_array().unwrap().iter().enumerate() {
        let right = correct_index(mcq);
        let option = if i < correct { right } else { (right + 1) % 4 };
        let response = client
            .put(format!(
                "{}/api/sessions/{}/mcq/{}",
                address,
                id,
                mcq["id"].as_str().unwrap()
            ))
            .json(&json!({ "option": option }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 200);
    }
}

async fn finish_mcq(client: &reqwest::Client, address: &str, id: &str) -> Value {
    let response = client
        .post(format!("{}/api/sessions/{}/mcq/finish", address, id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    response.json().await.unwrap()
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = spawn_default_app().await;
    let response = reqwest::get(format!("{}/random_path_that_does_not_exist", app.address))
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn catalog_lists_every_variant() {
    let app = spawn_default_app().await;
    let exams: Value = reqwest::get(format!("{}/api/exams", app.address))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let keys: Vec<&str> = exams
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["key"].as_str().unwrap())
        .collect();
    assert_eq!(
        keys,
        ["full-standard", "full-challenge", "mcq-practice", "essay-practice", "quick-10"]
    );

    let challenge: Value = reqwest::get(format!("{}/api/exams/full-challenge", app.address))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(challenge["mcq_pass_threshold"], 50);
    assert_eq!(challenge["total_minutes"], 240);
}

#[tokio::test]
async fn unknown_exam_is_rejected_and_creates_nothing() {
    let app = spawn_default_app().await;
    let client = reqwest::Client::new();

    let response = start(&client, &app.address, "full-marathon", json!({})).await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid exam configuration");
    assert_eq!(app.exams.active_sessions().await, 0);
}

#[tokio::test]
async fn quick_ten_pads_a_short_pool() {
    let app = spawn_app(
        MemoryQuestionBank::new(curated_mcqs(3), Vec::new()),
        Arc::new(MemorySessionStore::new()),
    )
    .await;
    let client = reqwest::Client::new();

    let response = start(&client, &app.address, "quick-10", json!({ "tutorial": false })).await;
    assert_eq!(response.status().as_u16(), 201);
    let view: Value = response.json().await.unwrap();

    assert_eq!(view["status"], "MCQ_IN_PROGRESS");
    let mcqs = view["mcqs"].as_array().unwrap();
    assert_eq!(mcqs.len(), 10);
    let curated = mcqs
        .iter()
        .filter(|q| q["id"].as_str().unwrap().starts_with("mcq-"))
        .count();
    assert_eq!(curated, 3);
    // Correct answers never leave the server.
    assert!(mcqs[0].get("correct_option").is_none());
    assert!(view["remaining_seconds"].as_i64().unwrap() <= 15 * 60);
}

#[tokio::test]
async fn tutorial_walks_sixteen_pages_then_starts() {
    let app = spawn_default_app().await;
    let client = reqwest::Client::new();

    let view: Value = start(&client, &app.address, "full-standard", json!({}))
        .await
        .json()
        .await
        .unwrap();
    let id = view["id"].as_str().unwrap().to_string();
    assert_eq!(view["status"], "NOT_STARTED");
    assert_eq!(view["intro_page"], 1);
    assert!(view["mcqs"].as_array().unwrap().is_empty());

    let page: Value = client
        .get(format!("{}/api/sessions/{}/intro", app.address, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["number"], 1);
    assert_eq!(page["total"], 16);
    assert!(page["body"].as_str().unwrap().contains("240 minutes"));

    // Back on page 1 stays on page 1.
    let back: Value = client
        .post(format!("{}/api/sessions/{}/intro/back", app.address, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(back["intro_page"], 1);

    let mut last = Value::Null;
    for _ in 0..15 {
        last = client
            .post(format!("{}/api/sessions/{}/intro/next", app.address, id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    }
    assert_eq!(last["intro_page"], 16);
    assert_eq!(last["status"], "NOT_STARTED");

    let started: Value = client
        .post(format!("{}/api/sessions/{}/intro/next", app.address, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(started["status"], "MCQ_IN_PROGRESS");
    assert_eq!(started["mcqs"].as_array().unwrap().len(), 100);
    assert!(started["started_at"].is_string());
}

#[tokio::test]
async fn challenge_below_threshold_locks_the_essays() {
    let app = spawn_default_app().await;
    let client = reqwest::Client::new();

    let view: Value = start(&client, &app.address, "full-challenge", json!({ "tutorial": false }))
        .await
        .json()
        .await
        .unwrap();
    let id = view["id"].as_str().unwrap().to_string();
    answer_all(&client, &app.address, &view, 40).await;

    let finished = finish_mcq(&client, &app.address, &id).await;
    assert_eq!(finished["status"], "ESSAY_LOCKED");
    assert_eq!(finished["mcq_score"], 40);
    assert!(finished["essays"].as_array().unwrap().is_empty());
    assert!(finished["completed_at"].is_string());

    let response = client
        .put(format!("{}/api/sessions/{}/essays/gen-essay-part1-1", app.address, id))
        .json(&json!({ "text": "too late" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    // Finishing again changes nothing.
    let again = finish_mcq(&client, &app.address, &id).await;
    assert_eq!(again["status"], "ESSAY_LOCKED");
    assert_eq!(again["mcq_score"], 40);
}

#[tokio::test]
async fn challenge_above_threshold_opens_the_essays() {
    let app = spawn_default_app().await;
    let client = reqwest::Client::new();

    let view: Value = start(&client, &app.address, "full-challenge", json!({ "tutorial": false }))
        .await
        .json()
        .await
        .unwrap();
    let id = view["id"].as_str().unwrap().to_string();
    answer_all(&client, &app.address, &view, 55).await;

    let finished = finish_mcq(&client, &app.address, &id).await;
    assert_eq!(finished["status"], "ESSAY_IN_PROGRESS");
    assert_eq!(finished["mcq_score"], 55);
    let essays = finished["essays"].as_array().unwrap();
    assert_eq!(essays.len(), 2);
    assert!(finished["remaining_seconds"].as_i64().unwrap() <= 60 * 60);

    let first = essays[0]["id"].as_str().unwrap();
    let response = client
        .put(format!("{}/api/sessions/{}/essays/{}", app.address, id, first))
        .json(&json!({ "text": "Reconcile the variances first." }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let done: Value = client
        .post(format!("{}/api/sessions/{}/essays/finish", app.address, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(done["status"], "COMPLETED");
    assert_eq!(done["essay_answers"][first], "Reconcile the variances first.");
    assert_eq!(done["essay_answers"].as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn answers_outside_the_active_phase_conflict() {
    let app = spawn_default_app().await;
    let client = reqwest::Client::new();

    let view: Value = start(&client, &app.address, "quick-10", json!({}))
        .await
        .json()
        .await
        .unwrap();
    let id = view["id"].as_str().unwrap();

    // Still on the tutorial.
    let response = client
        .put(format!("{}/api/sessions/{}/mcq/mcq-1", app.address, id))
        .json(&json!({ "option": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn flags_and_cleared_answers_are_tracked() {
    let app = spawn_default_app().await;
    let client = reqwest::Client::new();

    let view: Value = start(&client, &app.address, "quick-10", json!({ "tutorial": false }))
        .await
        .json()
        .await
        .unwrap();
    let id = view["id"].as_str().unwrap();
    let qid = view["mcqs"][0]["id"].as_str().unwrap();

    let flagged: Value = client
        .put(format!("{}/api/sessions/{}/mcq/{}/flag", app.address, id, qid))
        .json(&json!({ "flagged": true }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(flagged["flagged_count"], 1);
    assert_eq!(flagged["answered_count"], 0);

    let answered: Value = client
        .put(format!("{}/api/sessions/{}/mcq/{}", app.address, id, qid))
        .json(&json!({ "option": 2 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(answered["answered_count"], 1);

    let cleared: Value = client
        .put(format!("{}/api/sessions/{}/mcq/{}", app.address, id, qid))
        .json(&json!({ "option": null }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleared["answered_count"], 0);
    assert_eq!(cleared["flagged_count"], 1);

    let bad_option = client
        .put(format!("{}/api/sessions/{}/mcq/{}", app.address, id, qid))
        .json(&json!({ "option": 4 }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_option.status().as_u16(), 400);

    let unknown = client
        .put(format!("{}/api/sessions/{}/mcq/no-such-question", app.address, id))
        .json(&json!({ "option": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status().as_u16(), 400);
}

#[tokio::test]
async fn failing_store_warns_but_the_exam_continues() {
    let app = spawn_app(
        MemoryQuestionBank::new(curated_mcqs(20), Vec::new()),
        Arc::new(MemorySessionStore::unavailable()),
    )
    .await;
    let client = reqwest::Client::new();

    let response = start(&client, &app.address, "quick-10", json!({ "tutorial": false })).await;
    assert_eq!(response.status().as_u16(), 201);
    let view: Value = response.json().await.unwrap();
    assert!(view["persistence_warning"].is_string());

    let id = view["id"].as_str().unwrap().to_string();
    answer_all(&client, &app.address, &view, 10).await;
    let finished = finish_mcq(&client, &app.address, &id).await;
    assert_eq!(finished["status"], "COMPLETED");
    assert_eq!(finished["mcq_score"], 100);
    assert!(finished["persistence_warning"].is_string());
}

#[tokio::test]
async fn exit_discards_the_session() {
    let app = spawn_default_app().await;
    let client = reqwest::Client::new();

    let view: Value = start(&client, &app.address, "mcq-practice", json!({ "tutorial": false }))
        .await
        .json()
        .await
        .unwrap();
    let id = view["id"].as_str().unwrap();

    let response = client
        .delete(format!("{}/api/sessions/{}", app.address, id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let gone = client
        .get(format!("{}/api/sessions/{}", app.address, id))
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status().as_u16(), 404);
    assert_eq!(app.exams.active_sessions().await, 0);
}

#[tokio::test]
async fn signed_in_sessions_are_private() {
    let app = spawn_default_app().await;
    let client = reqwest::Client::new();
    let owner = sign_jwt(7, "user", JWT_SECRET, 600).unwrap();
    let stranger = sign_jwt(8, "user", JWT_SECRET, 600).unwrap();

    let view: Value = client
        .post(format!("{}/api/exams/quick-10/sessions", app.address))
        .bearer_auth(&owner)
        .json(&json!({ "part": "part2" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["part"], "part2");
    let id = view["id"].as_str().unwrap();

    let mine = client
        .get(format!("{}/api/sessions/{}", app.address, id))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap();
    assert_eq!(mine.status().as_u16(), 200);

    let theirs = client
        .get(format!("{}/api/sessions/{}", app.address, id))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(theirs.status().as_u16(), 404);

    let anonymous = client
        .get(format!("{}/api/sessions/{}", app.address, id))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status().as_u16(), 404);

    let forged = client
        .get(format!("{}/api/sessions/{}", app.address, id))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status().as_u16(), 401);
}

#[tokio::test]
async fn history_requires_a_token() {
    let app = spawn_default_app().await;
    let response = reqwest::get(format!("{}/api/exams/history", app.address))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn history_lists_the_users_attempts() {
    let app = spawn_default_app().await;
    let client = reqwest::Client::new();
    let token = sign_jwt(11, "user", JWT_SECRET, 600).unwrap();

    client
        .post(format!("{}/api/exams/quick-10/sessions", app.address))
        .bearer_auth(&token)
        .json(&json!({ "tutorial": false }))
        .send()
        .await
        .unwrap();

    let history: Value = client
        .get(format!("{}/api/exams/history?limit=5", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["config_key"], "quick-10");
    assert_eq!(entries[0]["status"], "MCQ_IN_PROGRESS");
}

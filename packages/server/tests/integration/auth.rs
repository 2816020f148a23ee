use serde_json::json;

use crate::common::{DEFAULT_IP, PASSWORD, TestApp, TestOptions, routes};

mod registration {
    use super::*;

    #[tokio::test]
    async fn new_user_can_register_with_valid_credentials() {
        let app = TestApp::spawn().await;

        let res = app.register("alice@example.com", PASSWORD).await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert!(res.body["user"]["id"].is_number());
        assert_eq!(res.body["user"]["email"], "alice@example.com");
        assert_eq!(res.body["user"]["notifications_enabled"], true);
        assert_eq!(res.body["user"]["security_email_new_device_enabled"], true);
        assert!(res.body["user"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn email_is_normalized_before_storing() {
        let app = TestApp::spawn().await;

        let res = app.register("  Alice@Example.COM ", PASSWORD).await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["user"]["email"], "alice@example.com");
    }

    #[tokio::test]
    async fn cannot_register_with_an_already_taken_email() {
        let app = TestApp::spawn().await;

        let first = app.register("alice@example.com", PASSWORD).await;
        assert_eq!(first.status, 201, "First registration failed: {}", first.text);

        let res = app.register("ALICE@example.com", PASSWORD).await;

        assert_eq!(res.status, 409);
        assert_eq!(res.error_code(), "EMAIL_TAKEN");
    }

    #[tokio::test]
    async fn cannot_register_with_a_weak_password() {
        let app = TestApp::spawn().await;

        let too_long = "a1!".repeat(50);
        for password in ["short1!", "no-digits-here", "n0specials", too_long.as_str()] {
            let res = app.register("alice@example.com", password).await;
            assert_eq!(res.status, 400, "password {password:?} was accepted");
            assert_eq!(res.error_code(), "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn cannot_register_with_a_malformed_email() {
        let app = TestApp::spawn().await;

        for email in ["", "alice", "alice@", "@example.com", "a b@example.com", "a@b@c.com"] {
            let res = app.register(email, PASSWORD).await;
            assert_eq!(res.status, 400, "email {email:?} was accepted");
            assert_eq!(res.error_code(), "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let app = TestApp::spawn().await;

        let res = app
            .client
            .post(app.url(routes::REGISTER))
            .header("Content-Type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), 400);
    }
}

mod login {
    use super::*;

    #[tokio::test]
    async fn registered_user_can_log_in() {
        let app = TestApp::spawn().await;
        app.register("alice@example.com", PASSWORD).await;

        let res = app.login("alice@example.com", PASSWORD).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert!(res.body["token"].as_str().is_some_and(|t| !t.is_empty()));
        assert_eq!(res.body["user"]["email"], "alice@example.com");
    }

    #[tokio::test]
    async fn login_email_is_case_insensitive() {
        let app = TestApp::spawn().await;
        app.register("alice@example.com", PASSWORD).await;

        let res = app.login(" ALICE@example.com", PASSWORD).await;

        assert_eq!(res.status, 200, "{}", res.text);
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let app = TestApp::spawn().await;
        app.register("alice@example.com", PASSWORD).await;

        let wrong_password = app.login("alice@example.com", "wr0ng-pass!").await;
        let unknown_email = app.login("nobody@example.com", PASSWORD).await;

        assert_eq!(wrong_password.status, 401);
        assert_eq!(unknown_email.status, 401);
        assert_eq!(wrong_password.error_code(), "INVALID_CREDENTIALS");
        assert_eq!(wrong_password.body, unknown_email.body);
    }

    #[tokio::test]
    async fn failed_login_does_not_record_a_device() {
        let app = TestApp::spawn().await;
        app.register("alice@example.com", PASSWORD).await;

        app.login("alice@example.com", "wr0ng-pass!").await;

        assert_eq!(app.count_rows("login_devices").await, 0);
        assert!(app.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn empty_credentials_are_rejected() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(routes::LOGIN, &json!({"email": "", "password": ""}))
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.error_code(), "VALIDATION_ERROR");
    }
}

mod new_device_notice {
    use super::*;

    #[tokio::test]
    async fn first_login_is_a_new_device_and_sends_a_notice() {
        let app = TestApp::spawn().await;
        app.register("alice@example.com", PASSWORD).await;

        let res = app.login("alice@example.com", PASSWORD).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["new_device"], true);

        let sent = app.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@example.com");
        assert_eq!(sent[0].subject, server::mail::NEW_DEVICE_SUBJECT);
        assert!(sent[0].text_body.contains(DEFAULT_IP));
    }

    #[tokio::test]
    async fn repeat_login_from_the_same_device_is_quiet() {
        let app = TestApp::spawn().await;
        app.register("alice@example.com", PASSWORD).await;

        app.login("alice@example.com", PASSWORD).await;
        let res = app.login("alice@example.com", PASSWORD).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["new_device"], false);
        assert_eq!(app.mailer.sent().len(), 1);
        assert_eq!(app.count_rows("login_devices").await, 1);
    }

    #[tokio::test]
    async fn different_user_agent_or_ip_is_a_new_device() {
        let app = TestApp::spawn().await;
        app.register("alice@example.com", PASSWORD).await;

        let first = app
            .login_from("alice@example.com", PASSWORD, "Firefox/130", "203.0.113.5")
            .await;
        let other_ua = app
            .login_from("alice@example.com", PASSWORD, "Safari/17", "203.0.113.5")
            .await;
        let other_ip = app
            .login_from("alice@example.com", PASSWORD, "Firefox/130", "203.0.113.99")
            .await;

        assert_eq!(first.body["new_device"], true);
        assert_eq!(other_ua.body["new_device"], true);
        assert_eq!(other_ip.body["new_device"], true);
        assert_eq!(app.mailer.sent().len(), 3);
        assert_eq!(app.count_rows("login_devices").await, 3);
    }

    #[tokio::test]
    async fn concurrent_logins_from_one_device_record_it_once() {
        let app = TestApp::spawn().await;
        app.register("alice@example.com", PASSWORD).await;

        let (a, b, c) = tokio::join!(
            app.login("alice@example.com", PASSWORD),
            app.login("alice@example.com", PASSWORD),
            app.login("alice@example.com", PASSWORD),
        );

        let new_devices = [a, b, c]
            .iter()
            .filter(|res| {
                assert_eq!(res.status, 200, "{}", res.text);
                res.body["new_device"] == true
            })
            .count();
        assert_eq!(new_devices, 1);
        assert_eq!(app.count_rows("login_devices").await, 1);
        assert_eq!(app.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn notice_is_not_sent_when_the_preference_is_off() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        assert_eq!(app.mailer.sent().len(), 1);

        let res = app
            .patch_with_token(
                routes::PREFERENCES,
                &json!({"security_email_new_device_enabled": false}),
                &token,
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);

        let res = app
            .login_from("alice@example.com", PASSWORD, "Other/1.0", "192.0.2.44")
            .await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["new_device"], true);
        assert_eq!(app.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn mail_failure_does_not_fail_the_login() {
        let app = TestApp::spawn_with(TestOptions {
            failing_mailer: true,
            ..Default::default()
        })
        .await;
        app.register("alice@example.com", PASSWORD).await;

        let res = app.login("alice@example.com", PASSWORD).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["new_device"], true);
        assert!(res.body["token"].is_string());
        assert_eq!(app.mailer.sent().len(), 1);
    }
}

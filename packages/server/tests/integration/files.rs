use ::common::storage::ContentHash;
use serde_json::json;

use crate::common::{TestApp, TestOptions, routes};

fn sha256_hex(content: &[u8]) -> String {
    ContentHash::compute(content).to_hex()
}

mod upload {
    use super::*;

    #[tokio::test]
    async fn upload_creates_a_file_at_version_one() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        let res = app
            .upload_with_token(routes::UPLOAD, "report.txt", b"quarterly numbers".to_vec(), &token)
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        let file = &res.body["file"];
        assert!(file["id"].is_number());
        assert_eq!(file["name"], "report.txt");
        assert_eq!(file["size"], 17);
        assert_eq!(file["sha256"], sha256_hex(b"quarterly numbers"));
        assert_eq!(file["mime_type"], "text/plain");
        assert_eq!(file["current_version"], 1);
        assert!(app.blob_exists(b"quarterly numbers").await);
        assert_eq!(app.count_rows("document_versions").await, 1);
    }

    #[tokio::test]
    async fn path_components_are_stripped_from_the_name() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        let res = app
            .upload_with_token(routes::UPLOAD, "../../etc/passwd", b"x".to_vec(), &token)
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["file"]["name"], "passwd");
    }

    #[tokio::test]
    async fn empty_file_is_accepted() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        let res = app
            .upload_with_token(routes::UPLOAD, "empty.bin", Vec::new(), &token)
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["file"]["size"], 0);
        assert_eq!(res.body["file"]["sha256"], sha256_hex(b""));
    }

    #[tokio::test]
    async fn identical_uploads_become_separate_files() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        let first = app.create_file(&token, "a.txt", b"same").await;
        let second = app.create_file(&token, "b.txt", b"same").await;

        assert_ne!(first, second);
        assert_eq!(app.count_rows("documents").await, 2);
    }

    #[tokio::test]
    async fn missing_file_field_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        let form = reqwest::multipart::Form::new().text("note", "no file here");
        let res = app
            .client
            .post(app.url(routes::UPLOAD))
            .bearer_auth(&token)
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), 400);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["detail"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn non_multipart_body_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        let res = app
            .post_with_token(routes::UPLOAD, &json!({"file": "nope"}), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_and_not_stored() {
        let app = TestApp::spawn_with(TestOptions {
            max_upload_bytes: 1024,
            ..Default::default()
        })
        .await;
        let token = app.create_authenticated_user("alice@example.com").await;
        let content = vec![b'x'; 4096];

        let res = app
            .upload_with_token(routes::UPLOAD, "big.bin", content.clone(), &token)
            .await;

        assert_eq!(res.status, 413, "{}", res.text);
        assert_eq!(res.error_code(), "PAYLOAD_TOO_LARGE");
        assert_eq!(app.count_rows("documents").await, 0);
        assert!(!app.blob_exists(&content).await);
    }

    #[tokio::test]
    async fn stored_blob_is_released_when_a_later_part_is_truncated() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        let body = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"file\"; filename=\"orphan.txt\"\r\n",
            "\r\n",
            "orphaned content\r\n",
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"note\"\r\n",
            "\r\n",
            "cut off mid-fie",
        );
        let res = app
            .post_raw_with_token(
                routes::UPLOAD,
                "multipart/form-data; boundary=XBOUNDARY",
                body.as_bytes().to_vec(),
                &token,
            )
            .await;

        assert_eq!(res.status, 400, "{}", res.text);
        assert_eq!(res.error_code(), "VALIDATION_ERROR");
        assert_eq!(app.count_rows("documents").await, 0);
        assert!(!app.blob_exists(b"orphaned content").await);
    }

    #[tokio::test]
    async fn upload_requires_a_token() {
        let app = TestApp::spawn().await;

        let part = reqwest::multipart::Part::bytes(b"x".to_vec()).file_name("x.txt");
        let res = app
            .client
            .post(app.url(routes::UPLOAD))
            .multipart(reqwest::multipart::Form::new().part("file", part))
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), 401);
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn list_shows_only_own_files_newest_first() {
        let app = TestApp::spawn().await;
        let alice = app.create_authenticated_user("alice@example.com").await;
        let bob = app.create_authenticated_user("bob@example.com").await;
        let older = app.create_file(&alice, "older.txt", b"1").await;
        let newer = app.create_file(&alice, "newer.txt", b"2").await;
        app.create_file(&bob, "bobs.txt", b"3").await;

        let res = app.get_with_token(routes::FILES, &alice).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["total"], 2);
        let ids: Vec<i64> = res.body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![newer, older]);
    }

    #[tokio::test]
    async fn search_is_a_case_insensitive_substring_match() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        app.create_file(&token, "Invoice-March.pdf", b"1").await;
        app.create_file(&token, "invoice-april.pdf", b"2").await;
        app.create_file(&token, "holiday.jpg", b"3").await;

        let res = app
            .get_with_token(&format!("{}?q=INVOICE", routes::FILES), &token)
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["total"], 2);
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        app.create_file(&token, "100%_done.txt", b"1").await;
        app.create_file(&token, "100 percent.txt", b"2").await;

        let percent = app
            .get_with_token(&format!("{}?q=100%25", routes::FILES), &token)
            .await;
        let underscore = app
            .get_with_token(&format!("{}?q=%25_d", routes::FILES), &token)
            .await;

        assert_eq!(percent.body["total"], 1);
        assert_eq!(percent.body["items"][0]["name"], "100%_done.txt");
        assert_eq!(underscore.body["total"], 1);
    }

    #[tokio::test]
    async fn search_never_reaches_other_users_files() {
        let app = TestApp::spawn().await;
        let alice = app.create_authenticated_user("alice@example.com").await;
        let bob = app.create_authenticated_user("bob@example.com").await;
        let own = app.create_file(&alice, "notes.txt", b"mine").await;
        app.create_file(&bob, "bobs.txt", b"his").await;
        app.create_file(&bob, "100%.txt", b"his too").await;

        let by_name = app
            .get_with_token(&format!("{}?q=bobs", routes::FILES), &alice)
            .await;
        let wildcard = app
            .get_with_token(&format!("{}?q=%25", routes::FILES), &alice)
            .await;
        let everything = app
            .get_with_token(&format!("{}?q=.", routes::FILES), &alice)
            .await;

        assert_eq!(by_name.status, 200, "{}", by_name.text);
        assert_eq!(by_name.body["total"], 0);
        assert_eq!(by_name.body["items"], json!([]));
        assert_eq!(wildcard.body["total"], 0);
        assert_eq!(wildcard.body["items"], json!([]));
        assert_eq!(everything.body["total"], 1);
        assert_eq!(everything.body["items"][0]["id"], own);
    }

    #[tokio::test]
    async fn pagination_reports_the_full_total() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        for i in 0..5 {
            app.create_file(&token, &format!("file-{i}.txt"), format!("{i}").as_bytes())
                .await;
        }

        let page = app
            .get_with_token(&format!("{}?limit=2&offset=2", routes::FILES), &token)
            .await;
        let past_end = app
            .get_with_token(&format!("{}?limit=2&offset=10", routes::FILES), &token)
            .await;

        assert_eq!(page.status, 200, "{}", page.text);
        assert_eq!(page.body["total"], 5);
        let names: Vec<&str> = page.body["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["file-2.txt", "file-1.txt"]);
        assert_eq!(past_end.body["total"], 5);
        assert_eq!(past_end.body["items"], json!([]));
    }

    #[tokio::test]
    async fn out_of_range_paging_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        for query in ["limit=0", "limit=201", "offset=-1", "limit=abc"] {
            let res = app
                .get_with_token(&format!("{}?{query}", routes::FILES), &token)
                .await;
            assert_eq!(res.status, 400, "{query} was accepted");
            assert_eq!(res.error_code(), "VALIDATION_ERROR");
        }
    }
}

mod details_and_download {
    use super::*;

    #[tokio::test]
    async fn file_details_are_returned() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        let id = app.create_file(&token, "notes.md", b"# hello").await;

        let res = app.get_with_token(&routes::file(id), &token).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["file"]["id"], id);
        assert_eq!(res.body["file"]["name"], "notes.md");
        assert_eq!(res.body["file"]["current_version"], 1);
        assert!(res.body["file"]["created_at"].is_string());
    }

    #[tokio::test]
    async fn download_streams_bytes_with_headers() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        let id = app.create_file(&token, "hello.txt", b"hello world").await;

        let res = app.get_with_token(&routes::download(id), &token).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.bytes, b"hello world");
        assert_eq!(res.headers["content-type"], "text/plain");
        assert_eq!(res.headers["content-length"], "11");
        let disposition = res.headers["content-disposition"].to_str().unwrap();
        assert!(disposition.starts_with("attachment;"));
        assert!(disposition.contains("hello.txt"));
        assert_eq!(
            res.headers["etag"].to_str().unwrap(),
            format!("\"{}\"", sha256_hex(b"hello world"))
        );
    }

    #[tokio::test]
    async fn matching_etag_yields_not_modified() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        let id = app.create_file(&token, "hello.txt", b"hello world").await;
        let etag = format!("\"{}\"", sha256_hex(b"hello world"));

        let res = app
            .client
            .get(app.url(&routes::download(id)))
            .bearer_auth(&token)
            .header("If-None-Match", format!("\"stale\", {etag}"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 304);

        let res = app
            .client
            .get(app.url(&routes::download(id)))
            .bearer_auth(&token)
            .header("If-None-Match", "\"stale\"")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn other_users_files_read_as_not_found() {
        let app = TestApp::spawn().await;
        let alice = app.create_authenticated_user("alice@example.com").await;
        let bob = app.create_authenticated_user("bob@example.com").await;
        let id = app.create_file(&alice, "private.txt", b"secret").await;

        let get = app.get_with_token(&routes::file(id), &bob).await;
        let download = app.get_with_token(&routes::download(id), &bob).await;
        let delete = app.delete_with_token(&routes::file(id), &bob).await;

        assert_eq!(get.status, 404);
        assert_eq!(get.error_code(), "NOT_FOUND");
        assert_eq!(download.status, 404);
        assert_eq!(delete.status, 404);
        assert_eq!(app.count_rows("documents").await, 1);
    }

    #[tokio::test]
    async fn non_numeric_id_is_a_validation_error() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        let res = app.get_with_token("/files/abc", &token).await;

        assert_eq!(res.status, 400);
        assert_eq!(res.error_code(), "VALIDATION_ERROR");
    }
}

mod by_hash {
    use super::*;

    #[tokio::test]
    async fn finds_own_files_with_matching_content() {
        let app = TestApp::spawn().await;
        let alice = app.create_authenticated_user("alice@example.com").await;
        let bob = app.create_authenticated_user("bob@example.com").await;
        app.create_file(&alice, "a.txt", b"shared content").await;
        app.create_file(&alice, "b.txt", b"shared content").await;
        app.create_file(&alice, "c.txt", b"different").await;
        app.create_file(&bob, "d.txt", b"shared content").await;

        let hash = sha256_hex(b"shared content");
        let res = app.get_with_token(&routes::by_hash(&hash), &alice).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["total"], 2);
    }

    #[tokio::test]
    async fn uppercase_hash_is_accepted() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        app.create_file(&token, "a.txt", b"abc").await;

        let hash = sha256_hex(b"abc").to_uppercase();
        let res = app.get_with_token(&routes::by_hash(&hash), &token).await;

        assert_eq!(res.body["total"], 1);
    }

    #[tokio::test]
    async fn no_match_is_an_empty_list() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        let res = app
            .get_with_token(&routes::by_hash(&sha256_hex(b"nothing")), &token)
            .await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["total"], 0);
        assert_eq!(res.body["items"], json!([]));
    }

    #[tokio::test]
    async fn malformed_hash_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        let res = app.get_with_token(&routes::by_hash("abc123"), &token).await;

        assert_eq!(res.status, 400);
        assert_eq!(res.error_code(), "VALIDATION_ERROR");
    }
}

mod deletion {
    use super::*;

    #[tokio::test]
    async fn deleted_file_is_gone() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        let id = app.create_file(&token, "gone.txt", b"bye").await;

        let res = app.delete_with_token(&routes::file(id), &token).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body, json!({}));
        assert_eq!(app.get_with_token(&routes::file(id), &token).await.status, 404);
        assert_eq!(app.delete_with_token(&routes::file(id), &token).await.status, 404);
        assert_eq!(app.count_rows("document_versions").await, 0);
        assert!(!app.blob_exists(b"bye").await);
    }

    #[tokio::test]
    async fn shared_blob_outlives_the_first_deletion() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        let first = app.create_file(&token, "one.txt", b"twin").await;
        let second = app.create_file(&token, "two.txt", b"twin").await;

        app.delete_with_token(&routes::file(first), &token).await;

        assert!(app.blob_exists(b"twin").await);
        let res = app.get_with_token(&routes::download(second), &token).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.bytes, b"twin");

        app.delete_with_token(&routes::file(second), &token).await;

        assert!(!app.blob_exists(b"twin").await);
    }

    #[tokio::test]
    async fn blob_still_used_by_an_old_version_is_kept() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        let keeper = app.create_file(&token, "keeper.txt", b"v1").await;
        let res = app
            .upload_version(keeper, b"v2".to_vec(), None, &token)
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
        let other = app.create_file(&token, "other.txt", b"v1").await;

        app.delete_with_token(&routes::file(other), &token).await;

        assert!(app.blob_exists(b"v1").await);
    }

    #[tokio::test]
    async fn delete_racing_an_identical_upload_keeps_the_new_file() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        let target = app.create_file(&token, "target.txt", b"target").await;

        for round in 0..10 {
            let content = format!("shared content {round}").into_bytes();
            let doomed = app.create_file(&token, "doomed.txt", &content).await;

            let doomed_route = routes::file(doomed);
            let (deleted, uploaded, versioned) = tokio::join!(
                app.delete_with_token(&doomed_route, &token),
                app.upload_with_token(routes::UPLOAD, "fresh.txt", content.clone(), &token),
                app.upload_version(target, content.clone(), None, &token),
            );

            assert_eq!(deleted.status, 200, "{}", deleted.text);
            assert_eq!(uploaded.status, 201, "{}", uploaded.text);
            assert_eq!(versioned.status, 201, "{}", versioned.text);
            assert!(app.blob_exists(&content).await, "round {round} lost the blob");

            let fresh = uploaded.body["file"]["id"].as_i64().unwrap();
            for id in [fresh, target] {
                let res = app.get_with_token(&routes::download(id), &token).await;
                assert_eq!(res.status, 200, "round {round}: {}", res.text);
                assert_eq!(res.bytes, content);
            }

            app.delete_with_token(&routes::file(fresh), &token).await;
        }
    }
}

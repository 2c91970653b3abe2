//! End-to-end tests for add_song, the queue, and auto-advance.

mod common;

use std::time::Duration;

use common::{TestServer, WsClient};
use serde_json::json;

#[tokio::test]
async fn first_add_song_promotes_to_current_even_unrequested() {
    let server = TestServer::spawn().await;
    let mut a = WsClient::connect(&server).await;
    a.join("room1").await;

    a.send(json!({
        "type": "add_song",
        "song": {"id": "s1", "title": "X"},
        "setAsCurrent": false
    }))
    .await;

    let response = a
        .wait_for_type("song_added_response", Duration::from_secs(5))
        .await
        .expect("Should receive song_added_response");
    assert_eq!(response["success"], true);
    assert_eq!(response["song"]["id"], "s1");
    assert_eq!(response["setAsCurrent"], true);
    assert_eq!(response["queueLength"], 0);

    let notification = a
        .wait_for_type("new_song_notification", Duration::from_secs(5))
        .await
        .expect("Should receive new_song_notification");
    assert_eq!(notification["song"]["id"], "s1");
    assert_eq!(notification["wasIdle"], true);
    assert_eq!(notification["startTime"], notification["serverTime"]);

    a.close().await;
}

#[tokio::test]
async fn add_song_while_playing_queues_without_broadcast() {
    let server = TestServer::spawn().await;
    let mut a = WsClient::connect(&server).await;
    a.join("room1").await;

    a.send(json!({
        "type": "add_song",
        "song": {"id": "s1", "title": "X"},
        "setAsCurrent": false
    }))
    .await;
    a.wait_for_type("new_song_notification", Duration::from_secs(5))
        .await
        .expect("First song should start");

    a.send(json!({
        "type": "add_song",
        "song": {"id": "s2", "title": "Y"},
        "setAsCurrent": false
    }))
    .await;

    let response = a
        .wait_for_type("song_added_response", Duration::from_secs(5))
        .await
        .expect("Should receive song_added_response");
    assert_eq!(response["setAsCurrent"], false);
    assert_eq!(response["queueLength"], 1);

    // A plain enqueue notifies nobody.
    a.expect_silence(Duration::from_millis(400)).await;
    a.close().await;
}

#[tokio::test]
async fn add_song_set_as_current_replaces_playing_song() {
    let server = TestServer::spawn().await;
    let mut a = WsClient::connect(&server).await;
    a.join("room1").await;

    a.send(json!({
        "type": "add_song",
        "song": {"id": "s1", "title": "X"},
        "setAsCurrent": false
    }))
    .await;
    a.wait_for_type("new_song_notification", Duration::from_secs(5))
        .await
        .expect("First song should start");

    a.send(json!({
        "type": "add_song",
        "song": {"id": "s2", "title": "Y"},
        "setAsCurrent": true
    }))
    .await;

    let notification = a
        .wait_for_type("new_song_notification", Duration::from_secs(5))
        .await
        .expect("Should receive new_song_notification for the replacement");
    assert_eq!(notification["song"]["id"], "s2");
    assert_eq!(notification["wasIdle"], false);

    a.close().await;
}

#[tokio::test]
async fn add_song_without_song_errors() {
    let server = TestServer::spawn().await;
    let mut a = WsClient::connect(&server).await;
    a.join("room1").await;

    a.send(json!({"type": "add_song", "setAsCurrent": true})).await;

    let error = a
        .wait_for_type("error", Duration::from_secs(5))
        .await
        .expect("Should receive error");
    assert!(error["message"].as_str().unwrap().contains("song"));

    a.close().await;
}

#[tokio::test]
async fn playback_ended_advances_to_queued_song_for_all_members() {
    let server = TestServer::spawn().await;
    let mut a = WsClient::connect(&server).await;
    let mut b = WsClient::connect(&server).await;
    a.join("room1").await;
    b.join("room1").await;

    a.send(json!({
        "type": "add_song",
        "song": {"id": "s1", "title": "X"},
        "setAsCurrent": false
    }))
    .await;
    a.wait_for_type("new_song_notification", Duration::from_secs(5))
        .await
        .expect("First song should start");
    b.wait_for_type("new_song_notification", Duration::from_secs(5))
        .await
        .expect("B should see the first song start");

    a.send(json!({
        "type": "add_song",
        "song": {"id": "s2", "title": "Y"},
        "setAsCurrent": false
    }))
    .await;
    a.wait_for_type("song_added_response", Duration::from_secs(5))
        .await
        .expect("Queueing should be acknowledged");

    a.send(json!({"type": "playback_ended"})).await;

    for client in [&mut a, &mut b] {
        let notification = client
            .wait_for_type("new_song_notification", Duration::from_secs(5))
            .await
            .expect("Should receive the auto-advance notification");
        assert_eq!(notification["song"]["id"], "s2");
        assert!(notification.get("wasIdle").is_none());
        assert_eq!(notification["startTime"], notification["serverTime"]);
    }

    // The queue is empty after the advance.
    a.send(json!({"type": "get_room_state", "requestId": "q"})).await;
    let state = a
        .wait_for_type("room_state_response", Duration::from_secs(5))
        .await
        .expect("Should receive room_state_response");
    assert_eq!(state["requestId"], "q");
    assert_eq!(state["queue"].as_array().unwrap().len(), 0);
    assert_eq!(state["playbackState"]["songId"], "s2");

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn playback_ended_with_empty_queue_goes_idle_quietly() {
    let server = TestServer::spawn().await;
    let mut a = WsClient::connect(&server).await;
    let mut b = WsClient::connect(&server).await;
    a.join("room1").await;
    b.join("room1").await;

    a.send(json!({
        "type": "add_song",
        "song": {"id": "s2", "title": "Y"},
        "setAsCurrent": false
    }))
    .await;
    a.wait_for_type("new_song_notification", Duration::from_secs(5))
        .await
        .expect("Song should start");
    b.wait_for_type("new_song_notification", Duration::from_secs(5))
        .await
        .expect("B should see the song start");

    a.send(json!({"type": "playback_ended"})).await;

    // The transition to idle is quiet.
    a.expect_silence(Duration::from_millis(400)).await;
    b.expect_silence(Duration::from_millis(400)).await;

    // But a later sync shows the idle state.
    b.send(json!({"type": "sync_request"})).await;
    let sync = b
        .wait_for_type("sync_response", Duration::from_secs(5))
        .await
        .expect("Should receive sync_response");
    assert_eq!(sync["playbackState"]["isPlaying"], false);
    assert_eq!(sync["playbackState"]["currentSong"], serde_json::Value::Null);
    assert_eq!(sync["playbackState"]["position"], 0.0);
    assert_eq!(sync["playbackState"]["startTime"], serde_json::Value::Null);

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn room_state_response_lists_queued_songs_in_order() {
    let server = TestServer::spawn().await;
    let mut a = WsClient::connect(&server).await;
    a.join("room1").await;

    for (id, title) in [("s1", "X"), ("s2", "Y"), ("s3", "Z")] {
        a.send(json!({
            "type": "add_song",
            "song": {"id": id, "title": title},
            "setAsCurrent": false
        }))
        .await;
        a.wait_for_type("song_added_response", Duration::from_secs(5))
            .await
            .expect("Add should be acknowledged");
    }

    a.send(json!({"type": "get_room_state", "requestId": 7})).await;
    let state = a
        .wait_for_type("room_state_response", Duration::from_secs(5))
        .await
        .expect("Should receive room_state_response");

    assert_eq!(state["requestId"], 7);
    let queue = state["queue"].as_array().unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0]["id"], "s2");
    assert_eq!(queue[1]["id"], "s3");
    assert_eq!(state["playbackState"]["songId"], "s1");

    a.close().await;
}

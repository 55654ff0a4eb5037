use scoop_core::domain::conversation::ConversationId;
use scoop_core::flows::{DialogManager, TurnInput, TurnStatus};
use scoop_db::{connect_with_settings, migrations, DialogStateRepository, SqlDialogStateRepository};

async fn turn(
    repo: &SqlDialogStateRepository,
    manager: &DialogManager,
    id: &ConversationId,
    text: &str,
) -> (Vec<String>, TurnStatus) {
    let stack = repo.load(id).await.expect("load");
    let outcome = manager.process_turn(stack, &TurnInput::text(text));
    repo.save(id, &outcome.stack).await.expect("save");
    (outcome.messages, outcome.status)
}

#[tokio::test]
async fn conversation_resumes_across_pool_restarts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("scoop.db").display());
    let manager = DialogManager::default();
    let id = ConversationId::new("restart-1");

    {
        let pool = connect_with_settings(&url, 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repo = SqlDialogStateRepository::new(pool.clone());
        turn(&repo, &manager, &id, "cone").await;
        turn(&repo, &manager, &id, "regular").await;
        pool.close().await;
    }

    let pool = connect_with_settings(&url, 1, 5).await.expect("reconnect");
    migrations::run_pending(&pool).await.expect("migrate again");
    let repo = SqlDialogStateRepository::new(pool);

    let (_, status) = turn(&repo, &manager, &id, "no").await;
    assert_eq!(status, TurnStatus::Waiting);
    let (messages, status) = turn(&repo, &manager, &id, "yes").await;

    assert!(matches!(status, TurnStatus::Completed(Some(_))));
    assert_eq!(
        messages,
        vec!["The humans will deliver you a Regular Cone ice cream for $2.50.\n\
              Enjoy your yummy ice cream."
            .to_string()]
    );
    assert!(repo.load(&id).await.expect("final load").is_empty());
}

#[tokio::test]
async fn conversations_do_not_share_state() {
    let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    let repo = SqlDialogStateRepository::new(pool);
    let manager = DialogManager::default();
    let first = ConversationId::new("a");
    let second = ConversationId::new("b");

    turn(&repo, &manager, &first, "cone").await;
    let (messages, _) = turn(&repo, &manager, &second, "cup").await;

    assert_eq!(
        messages.last().map(String::as_str),
        Some("Would you like more than one ice cream? (yes or no)")
    );
    assert_eq!(repo.load(&first).await.expect("load first").depth(), 2);
}

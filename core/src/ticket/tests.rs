//! Scenario tests for the ticket lifecycle

#[cfg(test)]
mod tests {
    use super::super::router::{
        DELIVERED_REACTION, DM_REFUSED_NOTICE, REFUSED_REACTION, RELAY_FAILED_NOTICE,
        MAX_REHOST_BYTES, TICKET_CLOSED_NOTICE, TICKET_FAILED_NOTICE, TICKET_OPENED_NOTICE,
    };
    use super::super::*;
    use crate::channels::base::{OverrideTarget, PermissionOverride};
    use crate::channels::mock::{MockPlatform, PlatformCall};
    use crate::error::{PlatformError, RelayError};
    use crate::messages::{Attribution, Target};
    use crate::types::{Attachment, ChannelId, MessageId, RoleId, UserId, UserRef};
    use std::sync::Arc;
    use std::time::Duration;

    const CATEGORY: ChannelId = ChannelId(500);

    fn settings() -> RouterSettings {
        RouterSettings {
            category: CATEGORY,
            staff_role: Some(RoleId(600)),
            channel_prefix: "ticket".to_string(),
            close_delay: Duration::ZERO,
        }
    }

    fn setup_with(settings: RouterSettings) -> (Arc<MockPlatform>, Arc<TicketRouter>) {
        let platform = Arc::new(MockPlatform::new());
        let router = Arc::new(TicketRouter::new(platform.clone(), settings));
        (platform, router)
    }

    fn setup() -> (Arc<MockPlatform>, Arc<TicketRouter>) {
        setup_with(settings())
    }

    fn user(id: u64) -> UserRef {
        UserRef::new(id, format!("U{}", id))
    }

    fn staff() -> UserRef {
        UserRef::new(9000, "moderator")
    }

    async fn open_ticket(router: &TicketRouter, user: &UserRef) -> ChannelId {
        let result = router.route_inbound_direct_message(user, "hello", &[]).await;
        result.channel_id.expect("ticket should open")
    }

    #[tokio::test]
    async fn test_first_direct_message_opens_ticket() {
        let (platform, router) = setup();
        let u1 = user(1);

        let result = router.route_inbound_direct_message(&u1, "hello", &[]).await;

        assert!(result.created);
        assert!(result.is_delivered());
        let channel_id = result.channel_id.unwrap();

        assert_eq!(platform.created_channels(), vec!["ticket-u1".to_string()]);
        assert_eq!(
            platform.created_overrides(),
            vec![vec![
                PermissionOverride::hidden(OverrideTarget::Everyone),
                PermissionOverride::read_write(OverrideTarget::Role(RoleId(600))),
                PermissionOverride::read_write(OverrideTarget::Bot),
            ]]
        );
        assert!(platform.calls().iter().any(|call| matches!(
            call,
            PlatformCall::CreateChannel { name, parent, .. }
                if name == "ticket-u1" && *parent == CATEGORY
        )));

        let to_user = platform.sent_to(Target::User(u1.id));
        assert_eq!(to_user.len(), 1);
        assert_eq!(to_user[0].content, TICKET_OPENED_NOTICE);

        let in_channel = platform.sent_to(Target::Channel(channel_id));
        assert_eq!(in_channel.len(), 2);
        assert!(in_channel[0].close_button);
        assert!(in_channel[0].attribution.is_none());
        assert_eq!(in_channel[1].content, "hello");
        assert_eq!(in_channel[1].attribution, Some(Attribution::User(u1.clone())));

        let ticket = router.lookup_by_user(u1.id).await.unwrap();
        assert_eq!(ticket.channel_id, channel_id);
        assert_eq!(ticket.state, TicketState::Open);
    }

    #[tokio::test]
    async fn test_ticket_without_staff_role_is_bot_only() {
        let (platform, router) = setup_with(RouterSettings {
            staff_role: None,
            ..settings()
        });

        open_ticket(&router, &user(1)).await;

        assert_eq!(
            platform.created_overrides(),
            vec![vec![
                PermissionOverride::hidden(OverrideTarget::Everyone),
                PermissionOverride::read_write(OverrideTarget::Bot),
            ]]
        );
    }

    #[tokio::test]
    async fn test_sequential_messages_reuse_one_channel() {
        let (platform, router) = setup();
        let u1 = user(1);

        let mut channels = Vec::new();
        for i in 0..5 {
            let result = router
                .route_inbound_direct_message(&u1, &format!("message {}", i), &[])
                .await;
            assert_eq!(result.created, i == 0);
            assert!(result.is_delivered());
            channels.push(result.channel_id.unwrap());
        }

        assert_eq!(platform.created_channels().len(), 1);
        assert!(channels.iter().all(|c| *c == channels[0]));

        let relayed: Vec<String> = platform
            .sent_to(Target::Channel(channels[0]))
            .into_iter()
            .filter(|m| m.attribution.is_some())
            .map(|m| m.content)
            .collect();
        assert_eq!(
            relayed,
            (0..5).map(|i| format!("message {}", i)).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_concurrent_burst_opens_single_ticket() {
        let (platform, router) = setup();
        let u1 = user(1);

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let router = Arc::clone(&router);
                let u1 = u1.clone();
                tokio::spawn(async move {
                    router
                        .route_inbound_direct_message(&u1, &format!("burst {}", i), &[])
                        .await
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(platform.created_channels().len(), 1);
        assert_eq!(results.iter().filter(|r| r.created).count(), 1);
        let first = results[0].channel_id.unwrap();
        assert!(results.iter().all(|r| r.channel_id == Some(first)));
        assert_eq!(router.open_ticket_count().await, 1);
        assert!(router.table_is_consistent().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_bursts_from_many_users() {
        let (platform, router) = setup();

        let mut handles = Vec::new();
        for round in 0..4 {
            for id in 1..=5 {
                let router = Arc::clone(&router);
                handles.push(tokio::spawn(async move {
                    router
                        .route_inbound_direct_message(&user(id), &format!("r{}", round), &[])
                        .await
                }));
            }
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_delivered());
        }

        assert_eq!(platform.created_channels().len(), 5);
        assert_eq!(router.open_ticket_count().await, 5);
        assert!(router.table_is_consistent().await);
    }

    #[tokio::test]
    async fn test_routing_is_a_bijection() {
        let (_platform, router) = setup();

        for round in 0..3 {
            for id in 1..=4 {
                router
                    .route_inbound_direct_message(&user(id), &format!("{}", round), &[])
                    .await;
            }
        }

        for ticket in router.open_tickets().await {
            let by_channel = router.lookup_by_channel(ticket.channel_id).await.unwrap();
            assert_eq!(by_channel.user_id, ticket.user_id);
            let by_user = router.lookup_by_user(ticket.user_id).await.unwrap();
            assert_eq!(by_user.channel_id, ticket.channel_id);
        }
        assert_eq!(router.open_ticket_count().await, 4);
    }

    #[tokio::test]
    async fn test_staff_reply_reaches_user() {
        let (platform, router) = setup();
        let u1 = user(1);
        let channel_id = open_ticket(&router, &u1).await;

        let result = router
            .route_inbound_channel_message(channel_id, &staff(), Some(MessageId(77)), "hi", &[])
            .await;

        assert!(result.is_delivered());
        assert!(!result.created);
        let to_user = platform.sent_to(Target::User(u1.id));
        let last = to_user.last().unwrap();
        assert_eq!(last.content, "hi");
        assert_eq!(last.attribution, Some(Attribution::Staff(staff())));
        assert_eq!(platform.reactions(), vec![DELIVERED_REACTION.to_string()]);
        assert!(router.lookup_by_user(u1.id).await.is_some());
    }

    #[tokio::test]
    async fn test_non_ticket_channel_is_never_relayed() {
        let (platform, router) = setup();
        open_ticket(&router, &user(1)).await;
        let calls_before = platform.calls().len();

        let result = router
            .route_inbound_channel_message(ChannelId(42), &staff(), Some(MessageId(1)), "secret", &[])
            .await;

        assert!(result.is_ignored());
        assert_eq!(platform.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_blocked_dm_is_reported_in_channel() {
        let (platform, router) = setup();
        let u1 = user(1);
        let channel_id = open_ticket(&router, &u1).await;
        platform.block_dms(u1.id);

        let result = router
            .route_inbound_channel_message(channel_id, &staff(), Some(MessageId(5)), "hi", &[])
            .await;

        assert!(matches!(result.failure, Some(RelayError::TargetUnreachable(_))));
        assert_eq!(result.channel_id, Some(channel_id));
        let last = platform.sent_to(Target::Channel(channel_id)).pop().unwrap();
        assert_eq!(last.content, DM_REFUSED_NOTICE);
        assert_eq!(platform.reactions(), vec![REFUSED_REACTION.to_string()]);

        // still open and reachable
        let ticket = router.lookup_by_channel(channel_id).await.unwrap();
        assert_eq!(ticket.user_id, u1.id);
        let again = router.route_inbound_direct_message(&u1, "still here", &[]).await;
        assert_eq!(again.channel_id, Some(channel_id));
        assert!(!again.created);
    }

    #[tokio::test]
    async fn test_close_then_reopen_uses_fresh_channel() {
        let (platform, router) = setup();
        let u1 = user(1);
        let old_channel = open_ticket(&router, &u1).await;

        let result = router.close_ticket(old_channel, &staff()).await;
        let CloseResult::Closed(closed) = result else {
            panic!("expected ticket to close");
        };
        assert_eq!(closed.ticket.user_id, u1.id);
        assert_eq!(closed.ticket.state, TicketState::Closed);
        assert!(closed.user_notified);
        assert!(closed.deletion.is_none());

        assert!(router.lookup_by_user(u1.id).await.is_none());
        assert!(router.lookup_by_channel(old_channel).await.is_none());
        assert_eq!(platform.deleted_channels(), vec![old_channel]);
        assert!(!platform.channel_alive(old_channel));

        let to_user = platform.sent_to(Target::User(u1.id));
        assert_eq!(to_user.last().unwrap().content, TICKET_CLOSED_NOTICE);

        // staff messages in the deleted channel go nowhere
        let calls_before = platform.calls().len();
        let ignored = router
            .route_inbound_channel_message(old_channel, &staff(), None, "anyone?", &[])
            .await;
        assert!(ignored.is_ignored());
        assert_eq!(platform.calls().len(), calls_before);

        let reopened = router.route_inbound_direct_message(&u1, "back again", &[]).await;
        assert!(reopened.created);
        assert_ne!(reopened.channel_id, Some(old_channel));
        assert_eq!(platform.created_channels().len(), 2);
    }

    #[tokio::test]
    async fn test_close_on_non_ticket_channel_is_noop() {
        let (platform, router) = setup();
        open_ticket(&router, &user(1)).await;
        let calls_before = platform.calls().len();

        let result = router.close_ticket(ChannelId(31337), &staff()).await;

        assert!(matches!(result, CloseResult::NotATicket));
        assert_eq!(platform.calls().len(), calls_before);
        assert_eq!(router.open_ticket_count().await, 1);
    }

    #[tokio::test]
    async fn test_second_close_reports_not_a_ticket() {
        let (_platform, router) = setup();
        let channel_id = open_ticket(&router, &user(1)).await;

        assert!(router.close_ticket(channel_id, &staff()).await.is_closed());
        assert!(!router.close_ticket(channel_id, &staff()).await.is_closed());
    }

    #[tokio::test]
    async fn test_close_succeeds_when_user_blocks_dms() {
        let (platform, router) = setup();
        let u1 = user(1);
        let channel_id = open_ticket(&router, &u1).await;
        platform.block_dms(u1.id);

        let CloseResult::Closed(closed) = router.close_ticket(channel_id, &staff()).await else {
            panic!("expected ticket to close");
        };
        assert!(!closed.user_notified);
        assert!(router.lookup_by_user(u1.id).await.is_none());
        assert_eq!(platform.deleted_channels(), vec![channel_id]);
    }

    #[tokio::test]
    async fn test_deferred_deletion_happens_after_table_removal() {
        let mut settings = settings();
        settings.close_delay = Duration::from_millis(20);
        let (platform, router) = setup_with(settings);
        let u1 = user(1);
        let channel_id = open_ticket(&router, &u1).await;

        let CloseResult::Closed(closed) = router.close_ticket(channel_id, &staff()).await else {
            panic!("expected ticket to close");
        };

        assert!(router.lookup_by_channel(channel_id).await.is_none());
        assert!(platform.deleted_channels().is_empty());

        // a message during the grace period opens a new ticket elsewhere
        let reopened = router.route_inbound_direct_message(&u1, "wait", &[]).await;
        assert!(reopened.created);
        assert_ne!(reopened.channel_id, Some(channel_id));

        closed.deletion.unwrap().await.unwrap();
        assert_eq!(platform.deleted_channels(), vec![channel_id]);
        assert!(router.lookup_by_user(u1.id).await.is_some());
    }

    #[tokio::test]
    async fn test_channel_creation_failure_leaves_table_untouched() {
        let (platform, router) = setup();
        let u1 = user(1);
        platform.fail_create(PlatformError::PermissionDenied("missing manage channels".to_string()));

        let result = router.route_inbound_direct_message(&u1, "hello", &[]).await;

        assert_eq!(result.channel_id, None);
        assert!(matches!(result.failure, Some(RelayError::PermissionDenied(_))));
        assert_eq!(router.open_ticket_count().await, 0);
        let to_user = platform.sent_to(Target::User(u1.id));
        assert_eq!(to_user.last().unwrap().content, TICKET_FAILED_NOTICE);

        platform.allow_create();
        let retry = router.route_inbound_direct_message(&u1, "hello?", &[]).await;
        assert!(retry.created);
        assert!(retry.is_delivered());
    }

    #[tokio::test]
    async fn test_server_error_on_create_is_platform_failure() {
        let (platform, router) = setup();
        let u1 = user(1);
        platform.fail_create(PlatformError::Other("HTTP 500 internal server error".to_string()));

        let result = router.route_inbound_direct_message(&u1, "hello", &[]).await;

        assert_eq!(result.channel_id, None);
        assert_eq!(
            result.failure,
            Some(RelayError::Platform("HTTP 500 internal server error".to_string()))
        );
        assert_eq!(router.open_ticket_count().await, 0);
        let to_user = platform.sent_to(Target::User(u1.id));
        assert_eq!(to_user.last().unwrap().content, TICKET_FAILED_NOTICE);
    }

    #[tokio::test]
    async fn test_existence_check_failure_keeps_ticket() {
        let (platform, router) = setup();
        let u1 = user(1);
        let channel_id = open_ticket(&router, &u1).await;
        platform.fail_exists(PlatformError::Other("rate limited".to_string()));

        let result = router.route_inbound_direct_message(&u1, "still there?", &[]).await;

        assert!(matches!(result.failure, Some(RelayError::Platform(_))));
        assert!(!result.created);
        let to_user = platform.sent_to(Target::User(u1.id));
        assert_eq!(to_user.last().unwrap().content, RELAY_FAILED_NOTICE);
        assert_eq!(router.lookup_by_user(u1.id).await.unwrap().channel_id, channel_id);
        assert_eq!(platform.created_channels().len(), 1);

        platform.allow_exists();
        let retry = router.route_inbound_direct_message(&u1, "hello again", &[]).await;
        assert!(retry.is_delivered());
        assert_eq!(retry.channel_id, Some(channel_id));
    }

    #[tokio::test]
    async fn test_missing_category_is_configuration_error() {
        let (platform, router) = setup();
        platform.fail_create(PlatformError::CategoryNotFound(CATEGORY.get()));

        let result = router.route_inbound_direct_message(&user(1), "hello", &[]).await;

        assert!(matches!(result.failure, Some(RelayError::ConfigurationMissing(_))));
        assert_eq!(router.open_ticket_count().await, 0);
    }

    #[tokio::test]
    async fn test_vanished_channel_is_reconciled() {
        let (platform, router) = setup();
        let u1 = user(1);
        let old_channel = open_ticket(&router, &u1).await;
        platform.vanish(old_channel);

        let result = router.route_inbound_direct_message(&u1, "hello?", &[]).await;

        assert!(result.created);
        let new_channel = result.channel_id.unwrap();
        assert_ne!(new_channel, old_channel);
        assert!(router.lookup_by_channel(old_channel).await.is_none());
        assert_eq!(router.lookup_by_channel(new_channel).await.unwrap().user_id, u1.id);
        assert!(router.table_is_consistent().await);
    }

    #[tokio::test]
    async fn test_channel_gone_between_lookup_and_send() {
        let (platform, router) = setup();
        let u1 = user(1);
        let channel_id = open_ticket(&router, &u1).await;
        platform.break_channel(channel_id);

        let result = router.route_inbound_direct_message(&u1, "lost", &[]).await;

        assert_eq!(result.channel_id, Some(channel_id));
        assert!(matches!(result.failure, Some(RelayError::TargetUnreachable(_))));
        assert!(router.lookup_by_user(u1.id).await.is_none());
        let to_user = platform.sent_to(Target::User(u1.id));
        assert_eq!(to_user.last().unwrap().content, RELAY_FAILED_NOTICE);

        let next = router.route_inbound_direct_message(&u1, "again", &[]).await;
        assert!(next.created);
        assert_ne!(next.channel_id, Some(channel_id));
    }

    #[tokio::test]
    async fn test_attachments_keep_their_order() {
        let (platform, router) = setup();
        let u1 = user(1);
        let attachments = vec![
            Attachment::new("b.png", "https://cdn/b.png"),
            Attachment::new("a.txt", "https://cdn/a.txt"),
            Attachment::new("c.pdf", "https://cdn/c.pdf"),
        ];

        let result = router
            .route_inbound_direct_message(&u1, "see files", &attachments)
            .await;

        let relayed = platform
            .sent_to(Target::Channel(result.channel_id.unwrap()))
            .pop()
            .unwrap();
        assert_eq!(relayed.files, vec!["b.png", "a.txt", "c.pdf"]);
        assert_eq!(relayed.content, "see files");
    }

    #[tokio::test]
    async fn test_unfetchable_attachment_becomes_link() {
        let (platform, router) = setup();
        let u1 = user(1);
        let channel_id = open_ticket(&router, &u1).await;
        platform.break_attachment("https://cdn/gone.png");
        let attachments = vec![
            Attachment::new("gone.png", "https://cdn/gone.png"),
            Attachment::new("ok.png", "https://cdn/ok.png"),
        ];

        router
            .route_inbound_channel_message(channel_id, &staff(), None, "look", &attachments)
            .await;

        let relayed = platform.sent_to(Target::User(u1.id)).pop().unwrap();
        assert_eq!(relayed.files, vec!["ok.png"]);
        assert_eq!(relayed.content, "look\nhttps://cdn/gone.png");
    }

    #[tokio::test]
    async fn test_oversized_attachment_is_linked_not_fetched() {
        let (platform, router) = setup();
        let u1 = user(1);
        let channel_id = open_ticket(&router, &u1).await;
        let attachments = vec![
            Attachment {
                size: MAX_REHOST_BYTES + 1,
                ..Attachment::new("huge.mp4", "https://cdn/huge.mp4")
            },
            Attachment {
                size: 2048,
                ..Attachment::new("small.png", "https://cdn/small.png")
            },
        ];

        router
            .route_inbound_channel_message(channel_id, &staff(), None, "files", &attachments)
            .await;

        let calls = platform.calls();
        assert!(!calls.contains(&PlatformCall::Fetch("https://cdn/huge.mp4".to_string())));
        assert!(calls.contains(&PlatformCall::Fetch("https://cdn/small.png".to_string())));
        let relayed = platform.sent_to(Target::User(u1.id)).pop().unwrap();
        assert_eq!(relayed.files, vec!["small.png"]);
        assert_eq!(relayed.content, "files\nhttps://cdn/huge.mp4");
    }

    #[tokio::test]
    async fn test_direct_reply_does_not_touch_tickets() {
        let (platform, router) = setup();
        let command_channel = ChannelId(77);

        let result = router
            .reply_to_user(command_channel, &staff(), UserId(5), "we got your report")
            .await;

        assert!(result.is_delivered());
        assert_eq!(router.open_ticket_count().await, 0);
        let dm = platform.sent_to(Target::User(UserId(5))).pop().unwrap();
        assert_eq!(dm.content, "we got your report");
        let confirm = platform.sent_to(Target::Channel(command_channel)).pop().unwrap();
        assert_eq!(confirm.content, "reply sent to <@5>.");

        platform.block_dms(UserId(6));
        let refused = router
            .reply_to_user(command_channel, &staff(), UserId(6), "hello")
            .await;
        assert!(matches!(refused.failure, Some(RelayError::TargetUnreachable(_))));
        let notice = platform.sent_to(Target::Channel(command_channel)).pop().unwrap();
        assert_eq!(notice.content, DM_REFUSED_NOTICE);
    }
}

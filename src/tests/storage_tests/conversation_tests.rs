// Conversation Tests - Testing titles, counterparts, intents and permissions

use crate::storage::{Conversation, ConversationKey, Identity, Message, OpenIntent};

fn me() -> Identity {
    Identity::new(1, "me")
}

#[test]
fn test_group_title_falls_back_to_id() {
    let named = Conversation::group(5, "Ops", vec![me()], Some(1));
    assert_eq!(named.title(&me(), None), "Ops");

    let unnamed = Conversation::group(5, "  ", vec![me()], Some(1));
    assert_eq!(unnamed.title(&me(), None), "Group #5");
}

#[test]
fn test_direct_title_prefers_last_sender() {
    let conversation = Conversation::direct(4, me(), Identity::new(2, "alice"));

    let from_other = Message::new(1, 4, 2, "Alice Cooper", "hi");
    assert_eq!(conversation.title(&me(), Some(&from_other)), "Alice Cooper");

    let from_me = Message::new(2, 4, 1, "me", "hello");
    assert_eq!(conversation.title(&me(), Some(&from_me)), "alice");
}

#[test]
fn test_direct_title_from_participants() {
    let conversation = Conversation {
        id: 4,
        is_group: false,
        group_name: None,
        other_participant: None,
        participants: vec![me(), Identity::new(3, "bob")],
        created_by: None,
    };
    assert_eq!(conversation.title(&me(), None), "bob");

    let orphan = Conversation {
        participants: vec![me()],
        ..conversation
    };
    assert_eq!(orphan.title(&me(), None), "Conversation #4");
}

#[test]
fn test_open_intent() {
    let direct = Conversation::direct(4, me(), Identity::new(2, "alice"));
    assert_eq!(direct.open_intent(&me()), OpenIntent::Direct { user_id: 2 });

    let group = Conversation::group(9, "Ops", vec![me()], None);
    assert_eq!(
        group.open_intent(&me()),
        OpenIntent::Group { conversation_id: 9 }
    );

    // Direct conversation without a resolvable counterpart opens by ID
    let crowded = Conversation {
        id: 6,
        is_group: false,
        group_name: None,
        other_participant: None,
        participants: vec![me(), Identity::new(2, "alice"), Identity::new(3, "bob")],
        created_by: None,
    };
    assert_eq!(
        crowded.open_intent(&me()),
        OpenIntent::Group { conversation_id: 6 }
    );
}

#[test]
fn test_can_delete() {
    let group = Conversation::group(9, "Ops", vec![me()], Some(1));
    assert!(group.can_delete(&me()));
    assert!(!group.can_delete(&Identity::new(2, "alice")));

    let mut staff = Identity::new(3, "admin");
    staff.is_staff = true;
    assert!(group.can_delete(&staff));

    let direct = Conversation::direct(4, me(), Identity::new(2, "alice"));
    assert!(!direct.can_delete(&staff));
}

#[test]
fn test_conversation_key_is_order_independent() {
    assert_eq!(ConversationKey::direct(1, 2), ConversationKey::direct(2, 1));

    let a = ConversationKey::group([3, 1, 2, 3], " Ops ");
    let b = ConversationKey::group([1, 2, 3], "Ops");
    assert_eq!(a, b);
    assert_eq!(a.participants.len(), 3);
    assert_ne!(a, ConversationKey::group([1, 2, 3], "Dev"));
}

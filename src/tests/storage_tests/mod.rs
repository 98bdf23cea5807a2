// Storage Tests Module - Testing the storage module
// Tests organized by storage module functionality:
// - message_tests: Message previews, attachments and latest-message selection
// - identity_tests: Identity matching of message senders
// - conversation_tests: Titles, counterparts, open intents and delete rights
// - intents_tests: Deep-link intent store (take/restore, persistence)
// - settings_tests: Settings (defaults, persistence, clamping)

mod conversation_tests;
mod intents_tests;
mod settings_tests;

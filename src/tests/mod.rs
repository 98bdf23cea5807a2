// Test modules for TickTask Chat
// Each module tests the corresponding source file; `support` holds the shared
// in-memory backend and recording sink.

mod support;

mod storage_tests;

pub mod persist_worker;

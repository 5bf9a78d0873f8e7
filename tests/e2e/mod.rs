// End-to-end tests for the ScriptCast job API
//
// Every test drives the real axum router over a local listener. Jobs are
// stored in Postgres through the sqlx repository, while the text and speech
// providers are in-process stubs.
//
// Architecture:
// - One shared PostgreSQL container for the entire test suite
// - Database pool creates/manages isolated databases (test_db_<uuid>)
// - Each test gets a unique database via test-context lifecycle hooks
// - Databases are truncated and recycled after test completion

mod helpers;
mod test_health;
mod test_job_repository;
mod test_jobs;

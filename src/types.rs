/// Unique failure record identifier (stable across runs).
/// Example: `platform/core-build#412`
pub type RecordId = String;
/// Name of the CI job or pipeline that failed.
/// Examples: `core-build`, `platform/core-build`
pub type JobName = String;
/// Per-job build number, monotonically increasing.
/// Example: `412`
pub type BuildNumber = u64;
/// Sequential category identifier assigned during clustering (starts at 1).
pub type CategoryId = usize;
/// Normalized failure text used as similarity input.
/// Example: `java.lang.NullPointerException: name at Foo.java:10`
pub type Excerpt = String;
/// Key in a record's opaque metadata bag.
/// Examples: `url`, `duration_ms`, `node`
pub type MetaKey = String;
/// Value in a record's opaque metadata bag.
/// Examples: `https://ci.example.com/job/core-build/412/`, `84211`, `agent-7`
pub type MetaValue = String;
/// Build-server endpoint URL used in error reports.
/// Example: `http://localhost:8080/scriptText`
pub type Endpoint = String;
/// Display form of a filesystem path carried in errors.
/// Example: `jenkins-failed/core-build#412.json`
pub type PathString = String;

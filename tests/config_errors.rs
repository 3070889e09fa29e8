// tests/config_errors.rs

use std::io::Write;
use tempfile::NamedTempFile;

use taskdock::config::load_and_validate;
use taskdock::errors::TaskdockError;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn dependency_cycles_return_a_structured_error() {
    let file = config_file(
        r#"
[task.build]
container = "a"

[container.a]
image = "a:1"
dependencies = ["b"]

[container.b]
image = "b:1"
dependencies = ["a"]
"#,
    );

    let result = load_and_validate(file.path());

    match result {
        Err(TaskdockError::DependencyCycle(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains('a') || msg.contains('b'));
        }
        Err(e) => panic!("Expected DependencyCycle error, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn unknown_dependencies_return_a_config_error() {
    let file = config_file(
        r#"
[task.build]
container = "a"

[container.a]
image = "a:1"
dependencies = ["nonexistent"]
"#,
    );

    let result = load_and_validate(file.path());

    match result {
        Err(TaskdockError::ConfigError(msg)) => {
            assert!(msg.contains("unknown dependency"));
            assert!(msg.contains("nonexistent"));
        }
        Err(e) => panic!("Expected ConfigError, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn tasks_must_reference_an_existing_container() {
    let file = config_file(
        r#"
[task.build]
container = "ghost"

[container.a]
image = "a:1"
"#,
    );

    let result = load_and_validate(file.path());

    match result {
        Err(TaskdockError::ConfigError(msg)) => {
            assert!(msg.contains("ghost"));
        }
        Err(e) => panic!("Expected ConfigError, got: {e:?}"),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn containers_need_exactly_one_image_source() {
    let both = config_file(
        r#"
[task.build]
container = "a"

[container.a]
image = "a:1"
build_directory = "docker/a"
"#,
    );

    assert!(matches!(
        load_and_validate(both.path()),
        Err(TaskdockError::ConfigError(msg)) if msg.contains("exactly one")
    ));

    let neither = config_file(
        r#"
[task.build]
container = "a"

[container.a]
command = "true"
"#,
    );

    assert!(matches!(
        load_and_validate(neither.path()),
        Err(TaskdockError::ConfigError(msg)) if msg.contains("either")
    ));
}

#[test]
fn out_of_range_ports_are_rejected() {
    let file = config_file(
        r#"
[task.build]
container = "a"

[container.a]
image = "a:1"
ports = ["8080:99999"]
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(TaskdockError::ConfigError(msg)) if msg.contains("port mapping")
    ));
}

#[test]
fn a_valid_config_resolves_to_domain_containers() {
    let file = config_file(
        r#"
[task.test]
container = "app"
command_args = ["--verbose"]

[container.app]
build_directory = "docker/app"
command = "npm test"
dependencies = ["db"]
ports = ["8080:80"]

[container.db]
image = "postgres:13"
environment = { PGDATA = "/data", HOST_HOME = "$HOME" }

[container.db.health_check]
interval = "2s"
retries = 5
"#,
    );

    let config = load_and_validate(file.path()).unwrap();
    let task = config.task("test").unwrap();
    assert_eq!(task.container, "app");
    assert_eq!(task.command_args, vec!["--verbose".to_string()]);

    let containers = config.containers().unwrap();
    let db = containers.get("db").unwrap();
    let check = db.health_check.as_ref().unwrap();
    assert_eq!(check.interval, Some(std::time::Duration::from_secs(2)));
    assert_eq!(check.retries, Some(5));
}

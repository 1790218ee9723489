//! Integration tests for query execution.
//!
//! The fixture is a small blog: a root class, posts and users sharing a
//! `Node` interface, and a `SearchResult` union over both.

use fql_runtime::definition::SCHEMA_CACHE_KIND;
use fql_runtime::{
    ArgDefinition, CacheStore, ClassDeclaration, DirectiveInstance, DirectiveResolver, Engine,
    EngineBuilder, EngineConfig, FieldDefinition, FnFieldResolver, FnPicker, FqlError,
    IdsDataFields, MemoryCache, MemoryLoader, PipelinePosition, PropertyResolver, Request,
    ScalarType, StageContext, SucceedingStages, TypeRef,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn scalar(ty: ScalarType) -> TypeRef {
    TypeRef::scalar(ty)
}

/// The blog fixture. `excerpt_calls` counts calls into the excerpt
/// resolver.
fn blog(excerpt_calls: Arc<AtomicUsize>) -> EngineBuilder {
    let root = FnFieldResolver::new()
        .field(
            FieldDefinition::new("posts", TypeRef::list(TypeRef::relational("Post"))).with_arg(
                ArgDefinition::new("limit", scalar(ScalarType::Int)).with_default(json!(10)),
            ),
            |_, args| {
                let limit: usize = args.get_as("limit").unwrap_or(10);
                Ok(json!([1, 2].into_iter().take(limit).collect::<Vec<_>>()))
            },
        )
        .field(
            FieldDefinition::new("post", TypeRef::relational("Post"))
                .with_arg(ArgDefinition::new("id", scalar(ScalarType::Id)).mandatory()),
            |_, args| Ok(args.get("id").cloned().unwrap_or(Value::Null)),
        )
        .field(
            FieldDefinition::new("search", TypeRef::list(TypeRef::relational("SearchResult"))),
            |_, _| Ok(json!(["1", "10"])),
        )
        .field(
            FieldDefinition::new("ghost", TypeRef::relational("Ghost")),
            |_, _| Ok(json!(1)),
        )
        .field(FieldDefinition::new("motd", scalar(ScalarType::String)), |_, _| {
            Ok(json!("welcome"))
        })
        .field(
            FieldDefinition::new("greeting", scalar(ScalarType::String)).with_arg(
                ArgDefinition::new("name", scalar(ScalarType::String)).with_default(json!("world")),
            ),
            |_, args| {
                let name: String = args.require("name")?;
                Ok(json!(format!("hello {name}")))
            },
        )
        .field(
            FieldDefinition::new("echo", scalar(ScalarType::Object))
                .with_arg(ArgDefinition::new("count", scalar(ScalarType::Int)))
                .with_arg(ArgDefinition::new("offset", scalar(ScalarType::Int)))
                .with_arg(ArgDefinition::new("since", scalar(ScalarType::Time)))
                .with_arg(ArgDefinition::new("link", scalar(ScalarType::Url))),
            |_, args| Ok(args.to_json()),
        )
        .field(FieldDefinition::new("isLive", scalar(ScalarType::Bool)), |_, _| {
            Ok(json!(true))
        })
        .field(FieldDefinition::new("isClosed", scalar(ScalarType::Bool)), |_, _| {
            Ok(json!(false))
        });

    let node = PropertyResolver::new().property(FieldDefinition::new("id", scalar(ScalarType::Id)));

    let post_properties = PropertyResolver::new()
        .property(FieldDefinition::new("title", scalar(ScalarType::String)))
        .property(FieldDefinition::new("status", scalar(ScalarType::String)))
        .property(FieldDefinition::new("subtitle", scalar(ScalarType::String)))
        .property(
            FieldDefinition::new("legacyTitle", scalar(ScalarType::String)).deprecated("use title"),
        );
    let post_fields = FnFieldResolver::new()
        .field(FieldDefinition::new("author", TypeRef::relational("User")), |item, _| {
            Ok(item["author"].clone())
        })
        .field(FieldDefinition::new("isDraft", scalar(ScalarType::Bool)), |item, _| {
            Ok(json!(item["status"] == "draft"))
        })
        .field(
            FieldDefinition::new("excerpt", scalar(ScalarType::String)).with_arg(
                ArgDefinition::new("length", scalar(ScalarType::Int)).with_default(json!(5)),
            ),
            move |item, args| {
                excerpt_calls.fetch_add(1, Ordering::SeqCst);
                let length: usize = args.require("length")?;
                let title = item["title"].as_str().unwrap_or_default();
                Ok(json!(title.chars().take(length).collect::<String>()))
            },
        );

    let user_properties =
        PropertyResolver::new().property(FieldDefinition::new("name", scalar(ScalarType::String)));
    let user_fields = FnFieldResolver::new().field(
        FieldDefinition::new("posts", TypeRef::list(TypeRef::relational("Post"))),
        |item, _| Ok(item["posts"].clone()),
    );

    Engine::builder()
        .with_class(ClassDeclaration::new("Root"))
        .with_class(ClassDeclaration::new("Node"))
        .with_class(ClassDeclaration::new("Post").implements("Node"))
        .with_class(ClassDeclaration::new("User").implements("Node"))
        .with_union("SearchResult")
        .with_root("Root")
        .with_loader(
            "Post",
            MemoryLoader::from_items([
                json!({"id": 1, "kind": "post", "title": "hello world", "status": "draft", "author": 10}),
                json!({"id": 2, "kind": "post", "title": "second post", "status": "published", "author": 11, "subtitle": "more"}),
            ]),
        )
        .with_loader(
            "User",
            MemoryLoader::from_items([
                json!({"id": 10, "kind": "user", "name": "ada", "posts": [1]}),
                json!({"id": 11, "kind": "user", "name": "grace", "posts": [2]}),
            ]),
        )
        .with_resolver("Root", root, 0)
        .with_resolver("Node", node, 0)
        .with_resolver("Post", post_properties, 0)
        .with_resolver("Post", post_fields, 0)
        .with_resolver("User", user_properties, 0)
        .with_resolver("User", user_fields, 0)
        .with_picker("SearchResult", FnPicker::by_property("Post", "kind", "post"), 10)
        .with_picker("SearchResult", FnPicker::by_property("User", "kind", "user"), 0)
}

fn engine() -> Engine {
    blog(Arc::new(AtomicUsize::new(0)))
        .build()
        .expect("fixture builds")
}

fn run(engine: &Engine, query: &str) -> fql_runtime::Response {
    init_tracing();
    engine.execute(query, Request::new()).expect("query executes")
}

type Log = Arc<Mutex<Vec<(String, Vec<String>)>>>;

/// Logs the token it runs as and the fields it was given.
struct Recorder {
    name: &'static str,
    position: PipelinePosition,
    log: Log,
}

impl DirectiveResolver for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn position(&self) -> PipelinePosition {
        self.position
    }

    fn execute(
        &self,
        instance: &DirectiveInstance,
        fields: &IdsDataFields,
        _succeeding: &mut SucceedingStages<'_>,
        _cx: &mut StageContext<'_, '_>,
    ) {
        let mut seen: Vec<String> = Vec::new();
        for field in fields.values().flat_map(|data_fields| &data_fields.direct) {
            if !seen.contains(field) {
                seen.push(field.clone());
            }
        }
        self.log
            .lock()
            .expect("log lock")
            .push((instance.token.clone(), seen));
    }
}

/// Schedules its fields again on every run.
struct Forever;

impl DirectiveResolver for Forever {
    fn name(&self) -> &str {
        "forever"
    }

    fn execute(
        &self,
        _instance: &DirectiveInstance,
        fields: &IdsDataFields,
        _succeeding: &mut SucceedingStages<'_>,
        cx: &mut StageContext<'_, '_>,
    ) {
        for (id, data_fields) in fields {
            for field in &data_fields.direct {
                cx.enqueue_field(id, field);
            }
        }
    }
}

/// Shares one cache between engines.
struct SharedCache(Arc<MemoryCache>);

impl CacheStore for SharedCache {
    fn get(&self, id: &str, kind: &str) -> Option<Value> {
        self.0.get(id, kind)
    }

    fn set(&self, id: &str, kind: &str, value: Value, ttl: Option<Duration>) {
        self.0.set(id, kind, value, ttl);
    }
}

// ============================================================================
// Levels and relations
// ============================================================================

/// Test that relational fields are resolved level by level.
#[test]
fn test_nested_relations() {
    let engine = engine();
    let response = run(&engine, "posts.id|title,posts.author.name");

    assert!(!response.has_errors(), "{:?}", response.to_json());
    assert_eq!(
        response.data,
        json!({
            "posts": [
                {"id": 1, "title": "hello world", "author": {"name": "ada"}},
                {"id": 2, "title": "second post", "author": {"name": "grace"}},
            ]
        })
    );
}

/// Test arguments, aliases and variables on relational fields.
#[test]
fn test_field_arguments_and_variables() {
    let engine = engine();
    init_tracing();
    let request = Request::new().with_variable("which", json!(1));
    let response = engine
        .execute("post(id:$which).title,posts(limit:1)@first.id", request)
        .expect("query executes");

    assert_eq!(
        response.data,
        json!({
            "post(id:$which)": {"title": "hello world"},
            "first": [{"id": 1}],
        })
    );
}

/// Test that a missing mandatory argument drops the field.
#[test]
fn test_missing_mandatory_argument() {
    let engine = engine();
    let response = run(&engine, "post.title,motd");

    assert_eq!(response.data, json!({"motd": "welcome"}));
    assert_eq!(
        response.schema.errors.get("post"),
        Some(&["Mandatory argument 'id' in field 'post' has not been provided".to_string()][..])
    );
}

/// Test that unknown fields are reported and left out.
#[test]
fn test_unknown_field() {
    let engine = engine();
    let response = run(&engine, "posts.title|nope");

    assert!(response.has_errors());
    assert_eq!(
        response.schema.errors.get("nope"),
        Some(&["There is no field 'nope' in class 'Post'".to_string()][..])
    );
    assert_eq!(
        response.data,
        json!({"posts": [{"title": "hello world"}, {"title": "second post"}]})
    );
}

/// Test that deprecated fields still resolve and are reported once.
#[test]
fn test_deprecated_field() {
    let engine = engine();
    let response = run(&engine, "posts.legacyTitle");

    assert_eq!(
        response.schema.deprecations.get("legacyTitle"),
        Some(&["Field 'legacytitle' is deprecated: use title".to_string()][..])
    );
    assert_eq!(
        response.data,
        json!({"posts": [{"legacyTitle": null}, {"legacyTitle": null}]})
    );
}

/// Test that a relational field into an undeclared class fails the query.
#[test]
fn test_unknown_relational_target() {
    let engine = engine();
    init_tracing();
    let err = engine.execute("ghost.id", Request::new()).unwrap_err();
    assert_eq!(err, FqlError::UnknownResolver("Ghost".to_string()));
}

/// Test that a failed argument cast drops only that argument.
#[test]
fn test_argument_cast_failure() {
    const FIELD: &str = "echo(count:\"abc\";offset:2)@e";
    let engine = engine();
    let response = run(&engine, FIELD);

    assert_eq!(response.data, json!({"e": {"offset": 2}}));
    let warnings = response.schema.warnings.get(FIELD).expect("cast warning");
    assert_eq!(warnings.len(), 1);
    assert!(
        warnings[0].starts_with("Casting value 'abc' for argument 'count'"),
        "{warnings:?}"
    );
}

/// Test that `now` is a valid time and that malformed URLs are dropped.
#[test]
fn test_time_and_url_arguments() {
    const FIELD: &str = "echo(since:now;link:\"1http://x\")@e";
    let unix_now = || {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_secs()
    };
    let engine = engine();
    let before = unix_now();
    let response = run(&engine, FIELD);
    let after = unix_now();

    let since = response.data["e"]["since"].as_u64().expect("timestamp");
    assert!((before..=after).contains(&since), "{since}");
    assert!(response.data["e"].get("link").is_none());
    let warnings = response.schema.warnings.get(FIELD).expect("cast warning");
    assert_eq!(
        warnings,
        ["Casting value '1http://x' for argument 'link' to type 'url' failed, so it has been ignored"]
    );

    let response = run(&engine, "echo(link:\"https://example.com/feed\")@e");
    assert_eq!(response.data, json!({"e": {"link": "https://example.com/feed"}}));
}

/// Test that aliases and directives share one resolver call per object.
#[test]
fn test_values_are_memoized() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = blog(Arc::clone(&calls)).build().expect("fixture builds");
    let response = run(
        &engine,
        "posts.excerpt|excerpt@again|excerpt<lowerCase>|excerpt(length:3)@short",
    );

    assert_eq!(
        response.data,
        json!({
            "posts": [
                {"excerpt": "hello", "again": "hello", "short": "hel"},
                {"excerpt": "secon", "again": "secon", "short": "sec"},
            ]
        })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

// ============================================================================
// Unions
// ============================================================================

/// Test that union items are dispatched to their member class.
#[test]
fn test_union_dispatch() {
    let engine = engine();
    let response = run(&engine, "search.id|title|name");

    assert!(!response.has_errors(), "{:?}", response.to_json());
    assert_eq!(
        response.data,
        json!({
            "search": [
                {"id": 1, "title": "hello world", "name": null},
                {"id": 10, "title": null, "name": "ada"},
            ]
        })
    );
}

/// Test that a field no member declares is a schema error.
#[test]
fn test_union_unknown_field() {
    let engine = engine();
    let response = run(&engine, "search.id|nope");

    assert_eq!(
        response.schema.errors.get("nope"),
        Some(&["There is no field 'nope' in class 'Post'".to_string()][..])
    );
    assert_eq!(response.data, json!({"search": [{"id": 1}, {"id": 10}]}));
}

// ============================================================================
// Directive pipeline
// ============================================================================

/// Test that directives run front, middle, then back.
#[test]
fn test_directive_zones() {
    let log = Log::default();
    let recorder = |name, position| {
        Arc::new(Recorder {
            name,
            position,
            log: Arc::clone(&log),
        })
    };
    let engine = blog(Arc::new(AtomicUsize::new(0)))
        .with_global_directive(recorder("recA", PipelinePosition::Back), 0)
        .with_global_directive(recorder("recB", PipelinePosition::Front), 0)
        .with_global_directive(recorder("recC", PipelinePosition::Middle), 0)
        .build()
        .expect("fixture builds");

    let response = run(&engine, "motd<recA,recB,recC>");
    assert!(!response.has_errors(), "{:?}", response.to_json());

    let order: Vec<String> = log
        .lock()
        .expect("log lock")
        .iter()
        .map(|(token, _)| token.clone())
        .collect();
    assert_eq!(order, ["recB", "recC", "recA"]);
}

/// Test that a repetition tag written in a query is reported instead of
/// being run as another occurrence.
#[test]
fn test_written_repetition_tag_is_rejected() {
    let response = run(&engine(), "motd<skip(if:false)|1,upperCase>");

    assert_eq!(response.data, json!({"motd": "WELCOME"}));
    assert_eq!(response.query_errors.len(), 1);
    assert!(
        response.query_errors[0]
            .message
            .contains("must not use the reserved symbol '|'"),
        "{:?}",
        response.query_errors
    );
    assert!(response.schema.errors.is_empty());
}

/// Test that each repetition of a directive runs on its own fields.
#[test]
fn test_repeated_directives_have_own_tokens() {
    let log = Log::default();
    let engine = blog(Arc::new(AtomicUsize::new(0)))
        .with_global_directive(
            Arc::new(Recorder {
                name: "recA",
                position: PipelinePosition::Back,
                log: Arc::clone(&log),
            }),
            0,
        )
        .build()
        .expect("fixture builds");

    run(&engine, "motd<recA>,greeting<recA,recA>");

    let log = log.lock().expect("log lock");
    assert_eq!(
        *log,
        [
            (
                "recA".to_string(),
                vec!["motd<recA>".to_string(), "greeting<recA,recA>".to_string()]
            ),
            ("recA|1".to_string(), vec!["greeting<recA,recA>".to_string()]),
        ]
    );
}

/// Test that an unknown directive is reported and the field still resolves.
#[test]
fn test_unknown_directive() {
    let engine = engine();
    let response = run(&engine, "motd<doesnotexist()>");

    assert_eq!(response.data, json!({"motd": "welcome"}));
    assert_eq!(
        response.schema.errors.get("doesnotexist()"),
        Some(&["No resolver found for directive 'doesnotexist'".to_string()][..])
    );
}

/// Test that a directive failure can stop the rest of the iteration.
#[test]
fn test_stop_pipeline_on_directive_failure() {
    let query = "motd<doesnotexist,upperCase>";

    let response = run(&engine(), query);
    assert_eq!(response.data, json!({"motd": "WELCOME"}));

    let engine = blog(Arc::new(AtomicUsize::new(0)))
        .with_config(EngineConfig::new().with_stop_pipeline_on_directive_failure(true))
        .build()
        .expect("fixture builds");
    let response = run(&engine, query);
    assert_eq!(response.data, json!({"motd": "welcome"}));
    assert!(response.schema.errors.contains_key("doesnotexist"));
}

/// Test that a pipeline that never settles is cut off.
#[test]
fn test_drain_iteration_limit() {
    let engine = blog(Arc::new(AtomicUsize::new(0)))
        .with_directive("Root", Forever, 0)
        .with_config(EngineConfig::new().with_max_drain_iterations(3))
        .build()
        .expect("fixture builds");
    let response = run(&engine, "motd<forever>");

    assert_eq!(response.data, json!({"motd": "welcome"}));
    assert_eq!(
        response.schema.errors.get("forever"),
        Some(
            &["Directive 'forever' has not been executed, as the pipeline reached its limit of 3 iterations"
                .to_string()][..]
        )
    );
}

/// Test skip and include, with static and per-object conditions.
#[test]
fn test_skip_and_include() {
    let engine = engine();

    let response = run(&engine, "posts.title<skip(if:isDraft())>");
    assert_eq!(
        response.data,
        json!({"posts": [{}, {"title": "second post"}]})
    );

    let response = run(&engine, "motd<include(if:false)>,greeting<include(if:true)>");
    assert_eq!(response.data, json!({"greeting": "hello world"}));
}

/// Test that a non-repeatable directive may appear only once per field.
#[test]
fn test_non_repeatable_directive() {
    const FIELD: &str = "motd<skip(if:false),skip(if:true)>";
    let engine = engine();
    let response = run(&engine, FIELD);

    assert_eq!(response.data, json!({"motd": "welcome"}));
    assert_eq!(
        response.schema.errors.get("skip(if:true)|1"),
        Some(
            &[format!(
                "Directive 'skip' can be executed only once for each field (affected field(s): '{FIELD}')"
            )][..]
        )
    );
}

/// Test that applyDirectives runs its directives in a later iteration.
#[test]
fn test_apply_directives() {
    let engine = engine();
    let response = run(
        &engine,
        "motd<applyDirectives(directives:[upperCase])>,greeting(name:ada)<titleCase>",
    );

    assert!(!response.has_errors(), "{:?}", response.to_json());
    assert_eq!(
        response.data,
        json!({"motd": "WELCOME", "greeting(name:ada)": "Hello Ada"})
    );
}

/// Test that exported values land in the response variables.
#[test]
fn test_export() {
    let engine = engine();
    let response = run(&engine, "motd<export(as:message)>,posts.title<export(as:titles)>");

    assert_eq!(response.variables.get("message"), Some(&json!("welcome")));
    assert_eq!(
        response.variables.get("titles"),
        Some(&json!(["hello world", "second post"]))
    );
}

/// Test that default fills in null values only.
#[test]
fn test_default() {
    let engine = engine();
    let response = run(&engine, "posts.subtitle<default(value:none)>");

    assert_eq!(
        response.data,
        json!({"posts": [{"subtitle": "none"}, {"subtitle": "more"}]})
    );
}

/// Test that cacheControl keeps the smallest max age.
#[test]
fn test_cache_control() {
    let engine = engine();
    let response = run(
        &engine,
        "motd<cacheControl(maxAge:60)>,greeting<cacheControl(maxAge:10)>",
    );
    assert_eq!(response.messages.get("cacheControl.maxAge"), Some(&json!(10)));

    let response = run(&engine, "motd<cacheControl(maxAge:-1)>");
    assert!(response.schema.errors.contains_key("cacheControl(maxAge:-1)"));
    assert!(response.messages.is_empty());
}

/// Test that children of a scalar field are resolved only when it is truthy.
#[test]
fn test_conditional_fields() {
    let engine = engine();
    let response = run(&engine, "isLive.motd,isClosed.greeting");

    assert!(!response.has_errors(), "{:?}", response.to_json());
    assert_eq!(
        response.data,
        json!({"isLive": true, "motd": "welcome", "isClosed": false})
    );
}

// ============================================================================
// Schema definitions
// ============================================================================

/// Test that a class met again while defining is replaced by a stub.
#[test]
fn test_schema_definition_recursion() {
    init_tracing();
    let engine = engine();
    let definition = engine.schema_definition("Post").expect("definition");

    assert_eq!(definition.class, "Post");
    assert!(!definition.recursion);
    assert_eq!(definition.interfaces, ["Node"]);
    assert!(definition.fields.contains_key("id"));
    assert_eq!(
        definition.fields["legacytitle"].deprecation.as_deref(),
        Some("use title")
    );
    assert!(!definition.directives["skip"].repeatable);

    let author = definition.fields["author"]
        .relational
        .as_deref()
        .expect("author is relational");
    assert_eq!(author.class, "User");
    assert!(!author.recursion);

    let back = author.fields["posts"]
        .relational
        .as_deref()
        .expect("posts is relational");
    assert_eq!(back.class, "Post");
    assert!(back.recursion);
    assert!(back.fields.is_empty());
    assert_eq!(back.resolver_id, definition.resolver_id);
    assert_eq!(definition.resolver_id.len(), 16);
}

/// Test that definitions are served from the cache store.
#[test]
fn test_schema_definition_cache() {
    init_tracing();
    let cache = Arc::new(MemoryCache::new());
    let build = || {
        blog(Arc::new(AtomicUsize::new(0)))
            .with_config(EngineConfig::new().with_cache(None))
            .with_cache(SharedCache(Arc::clone(&cache)))
            .build()
            .expect("fixture builds")
    };

    let first = build().schema_definition("SearchResult").expect("definition");
    assert!(cache.has("SearchResult", SCHEMA_CACHE_KIND));
    assert_eq!(
        first.members.iter().map(|m| m.class.as_str()).collect::<Vec<_>>(),
        ["Post", "User"]
    );

    let second = build().schema_definition("SearchResult").expect("definition");
    assert_eq!(first, second);
}

/// Test that undeclared classes have no definition.
#[test]
fn test_schema_definition_unknown_class() {
    let engine = engine();
    assert_eq!(
        engine.schema_definition("Ghost").unwrap_err(),
        FqlError::UnknownResolver("Ghost".to_string())
    );
}

use blockthread::{Config, Project, Runtime, Thread, ThreadStatus, Value};
use maplit::hashmap;

/// A sprite that calls a recursive custom block, and the stage with a script
/// of its own.
const PROJECT: &str = r#"{
  "targets": [
    {
      "isStage": true,
      "name": "Stage",
      "blocks": {
        "stage_hat": { "opcode": "event_whenbroadcastreceived", "next": "stage_say", "topLevel": true },
        "stage_say": { "opcode": "looks_switchbackdropto", "parent": "stage_hat" }
      }
    },
    {
      "isStage": false,
      "name": "Sprite1",
      "blocks": {
        "hat": { "opcode": "event_whenflagclicked", "next": "call", "topLevel": true },
        "call": {
          "opcode": "procedures_call",
          "parent": "hat",
          "next": "after",
          "inputs": { "arg_n": [1, [4, "3"]] },
          "mutation": { "tagName": "mutation", "children": [], "proccode": "countdown %s", "warp": "false" }
        },
        "after": { "opcode": "looks_say", "parent": "call" },
        "def": {
          "opcode": "procedures_definition",
          "next": "if",
          "topLevel": true,
          "inputs": { "custom_block": [1, "proto"] }
        },
        "proto": {
          "opcode": "procedures_prototype",
          "parent": "def",
          "shadow": true,
          "mutation": { "tagName": "mutation", "children": [], "proccode": "countdown %s" }
        },
        "if": {
          "opcode": "control_if",
          "parent": "def",
          "inputs": { "SUBSTACK": [2, "recurse"] }
        },
        "recurse": {
          "opcode": "procedures_call",
          "parent": "if",
          "next": "stop",
          "mutation": { "tagName": "mutation", "children": [], "proccode": "countdown %s" }
        },
        "stop": { "opcode": "control_stop", "parent": "recurse" }
      }
    }
  ]
}"#;

fn runtime() -> Runtime {
  PROJECT
    .parse::<Project>()
    .unwrap()
    .into_runtime(Config::default())
}

#[test]
fn procedure_call_scopes_params_and_detects_recursion() {
  let mut runtime = runtime();
  let sprite = runtime.target_by_name("Sprite1").unwrap();
  let mut thread: Thread<()> = Thread::new("hat", sprite);
  thread.push_stack(&mut runtime, "hat", None);
  thread.go_to_next_block(&mut runtime);
  assert_eq!(thread.peek_stack(), Some("call"));
  assert!(!thread.is_recursive_call(&runtime, "countdown %s"));

  thread.init_params(&mut runtime);
  for (name, value) in hashmap! { "n" => Value::from(3), "label" => Value::from("go") } {
    thread.push_param(&mut runtime, name, value);
  }
  thread.push_stack(&mut runtime, "if", None);
  thread.push_stack(&mut runtime, "recurse", None);
  assert_eq!(thread.get_param(&runtime, "n"), Some(&Value::from(3)));
  assert_eq!(thread.get_param(&runtime, "label"), Some(&Value::from("go")));
  assert!(thread.is_recursive_call(&runtime, "countdown %s"));
  assert!(!thread.is_recursive_call(&runtime, "countup %s"));

  // Stopping inside the procedure unwinds to the call and moves past it.
  thread.go_to_next_block(&mut runtime);
  assert_eq!(thread.peek_stack(), Some("stop"));
  thread.stop_this_script(&mut runtime);
  assert_eq!(thread.stack_size(), 1);
  assert_eq!(thread.peek_stack(), Some("after"));
  assert_eq!(thread.status, ThreadStatus::Running);
  assert!(thread.peek_stack_frame(&runtime).unwrap().params.is_none());

  thread.stop_this_script(&mut runtime);
  assert_eq!(thread.status, ThreadStatus::Done);
  assert_eq!(runtime.frame_pool.in_use(), 0);
}

#[test]
fn script_can_run_another_targets_blocks() {
  let mut runtime = runtime();
  let stage = runtime.target_by_name("Stage").unwrap();
  let sprite = runtime.target_by_name("Sprite1").unwrap();
  let mut thread: Thread<()> = Thread::new("hat", sprite);
  thread.push_stack(&mut runtime, "hat", None);

  thread.push_stack(&mut runtime, "stage_hat", Some(stage));
  assert_eq!(thread.target(), stage);
  thread.go_to_next_block(&mut runtime);
  assert_eq!(thread.peek_stack(), Some("stage_say"));

  assert_eq!(thread.pop_stack(&mut runtime), Some("stage_say".to_string()));
  assert_eq!(thread.target(), sprite);
  thread.go_to_next_block(&mut runtime);
  assert_eq!(thread.peek_stack(), Some("call"));
}

#[test]
fn frames_are_recycled_across_threads() {
  let mut runtime = runtime();
  let sprite = runtime.target_by_name("Sprite1").unwrap();
  for _ in 0..3 {
    let mut thread: Thread<()> = Thread::new("hat", sprite);
    thread.push_stack(&mut runtime, "hat", None);
    thread.push_stack(&mut runtime, "if", None);
    thread.push_stack(&mut runtime, "stop", None);
    thread.is_killed = true;
    thread.stop_this_script(&mut runtime);
    assert_eq!(thread.status, ThreadStatus::Done);
  }
  assert_eq!(runtime.frame_pool.capacity(), 3);
  assert_eq!(runtime.frame_pool.free_count(), 3);
}

use pipeline_shell::env::Environment;
use pipeline_shell::parser::parse_line;
use pipeline_shell::{Config, Interpreter, process};
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn make_unique_temp_dir(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "pipeline_it_{}_{}_{}",
        std::process::id(),
        tag,
        nanos
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn shell() -> Interpreter {
    Interpreter::new(Config {
        history_size: 8,
        color_prompt: false,
    })
}

#[test]
fn sort_pipeline_orders_lines() {
    let dir = make_unique_temp_dir("sort");
    let out = dir.join("sorted.txt");
    let mut sh = shell();

    let status = sh.run_line(&format!("printf b\\na\\nc\\n | sort > {}", out.display()));

    assert_eq!(status, 0);
    assert_eq!(fs::read_to_string(&out).unwrap(), "a\nb\nc\n");
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn grep_with_both_redirections() {
    let dir = make_unique_temp_dir("grep");
    let input = dir.join("in.txt");
    let out = dir.join("out.txt");
    fs::write(&input, "apple\nfoo bar\nbanana\nfood\n").unwrap();
    let mut sh = shell();

    let line = format!("grep -n foo < {} > {}", input.display(), out.display());
    let pipeline = parse_line(&line).unwrap().unwrap();
    let cmd = &pipeline.commands()[0];
    assert_eq!(cmd.argv, vec!["grep", "-n", "foo"]);
    assert!(!cmd.append);

    assert_eq!(sh.run_line(&line), 0);
    assert_eq!(fs::read_to_string(&out).unwrap(), "2:foo bar\n4:food\n");
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn long_pipeline_counts_lines() {
    let dir = make_unique_temp_dir("long");
    let out = dir.join("count.txt");
    let mut env = Environment::new();

    let line = format!(
        "printf x\\ny\\nx\\nz\\n | sort | uniq | wc -l > {}",
        out.display()
    );
    let pipeline = parse_line(&line).unwrap().unwrap();
    assert_eq!(pipeline.len(), 4);

    assert_eq!(process::execute(&pipeline, &mut env).unwrap(), 0);
    assert_eq!(fs::read_to_string(&out).unwrap().trim(), "3");
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn middle_stage_with_bad_input_does_not_block_siblings() {
    let dir = make_unique_temp_dir("middle");
    let out = dir.join("out.txt");
    let missing = dir.join("nope.txt");
    let mut sh = shell();

    let line = format!(
        "printf data\\n | cat < {} | wc -c > {}",
        missing.display(),
        out.display()
    );
    assert_eq!(sh.run_line(&line), 0);
    assert_eq!(fs::read_to_string(&out).unwrap().trim(), "0");
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn large_output_flows_through_pipes() {
    let dir = make_unique_temp_dir("large");
    let out = dir.join("bytes.txt");
    let mut sh = shell();

    // more than a pipe buffer, so every stage must be running concurrently
    let line = format!(
        "head -c 1000000 /dev/zero | cat | cat | wc -c > {}",
        out.display()
    );
    assert_eq!(sh.run_line(&line), 0);
    assert_eq!(fs::read_to_string(&out).unwrap().trim(), "1000000");
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn early_exit_of_reader_terminates_writer() {
    let dir = make_unique_temp_dir("sigpipe");
    let out = dir.join("first.txt");
    let mut sh = shell();

    assert_eq!(sh.run_line(&format!("yes | head -n 2 > {}", out.display())), 0);
    assert_eq!(fs::read_to_string(&out).unwrap(), "y\ny\n");
    let _ = fs::remove_dir_all(dir);
}

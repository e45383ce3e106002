use projgen_rs::{BuildSession, ToolKind};
use std::path::Path;
use std::time::{Duration, Instant};

fn bench<T>(label: &str, iterations: u32, mut f: impl FnMut() -> T) -> (Duration, T) {
    // Warmup
    for _ in 0..5 {
        std::hint::black_box(f());
    }

    let mut total = Duration::ZERO;
    let mut last = None;
    for _ in 0..iterations {
        let start = Instant::now();
        let result = f();
        total += start.elapsed();
        last = Some(result);
    }

    let avg = total / iterations;
    println!("{label:<45} {iterations:>6} iterations   avg {avg:>12.3?}   total {total:>12.3?}");
    (avg, last.unwrap())
}

fn main() {
    let source = std::fs::read_to_string("example.pgc")
        .expect("example.pgc not found — run from repo root");

    let iterations = 1000;

    println!("─── Performance: example.pgc ({} bytes) ───", source.len());
    println!();

    // 1. Full script processing (tokenize + interpret + property model)
    bench("process_script (full)", iterations, || {
        let mut session = BuildSession::new("win64").unwrap();
        session
            .process_script("example.pgc", &source, Path::new("."))
            .unwrap()
    });

    // 2. Condition parsing only (all conditions from the script)
    let conditions: Vec<String> = source
        .lines()
        .filter_map(|line| {
            let open = line.find('[')?;
            let close = line[open..].find(']')? + open;
            Some(line[open + 1..close].to_string())
        })
        .collect();
    let cond_count = conditions.len();
    bench(
        &format!("parse all {cond_count} conditions"),
        iterations,
        || {
            for cond in &conditions {
                std::hint::black_box(projgen_rs::parse_condition(cond).unwrap());
            }
        },
    );

    // 3. Condition evaluation against a seeded registry
    let session = BuildSession::new("win64").unwrap();
    bench(
        &format!("evaluate all {cond_count} conditions"),
        iterations,
        || {
            for cond in &conditions {
                let value = projgen_rs::evaluate(cond, &mut |name| {
                    Ok(session.conditionals.resolve_symbol(name).unwrap_or(false))
                })
                .unwrap();
                std::hint::black_box(value);
            }
        },
    );

    // 4. Macro substitution in a reference-heavy string
    let mut session = BuildSession::new("win64").unwrap();
    session.macros.set_script("SRCDIR", "..").unwrap();
    session.macros.set_script("OUTBINNAME", "engine").unwrap();
    bench("resolve_in_string (3 references)", iterations, || {
        session
            .macros
            .resolve_in_string("$SRCDIR/bin/$PLATFORM/$OUTBINNAME.dll", None)
            .unwrap()
    });

    // 5. Property cascade reads across the whole file tree
    let mut session = BuildSession::new("win64").unwrap();
    let project = session
        .process_script("example.pgc", &source, Path::new("."))
        .unwrap();
    bench("resolved_property (root + file cascade)", iterations, || {
        for config in ["Debug", "Release"] {
            let file = project.find_file("../engine/render_stub.cpp");
            let value = project
                .resolved_property(config, file, ToolKind::Compiler, "Optimization")
                .unwrap();
            std::hint::black_box(value);
        }
    });

    println!();
    println!("Done.");
}

use std::env;
use std::fs;
use std::path::Path;
use std::process;

use getopts::{Matches, Options as CliOptions};
use srcc::{CompileError, CompileResult, Options, codegen, driver, optimizer, parser, scanner, typecheck};

fn main() {
  env_logger::init();

  let args: Vec<String> = env::args().collect();
  let program_name = args
    .first()
    .map(String::as_str)
    .unwrap_or("compile")
    .to_string();

  let mut opts = CliOptions::new();
  opts.optopt("o", "", "output executable name (default derived from the input)", "NAME");
  opts.optopt("O", "", "optimisation level: 0, 1 or 2 (default 0)", "LEVEL");
  opts.optflag("R", "no-runtime", "emit C without linking the runtime stubs");
  opts.optflag("c", "", "stop after emitting C (do not invoke the toolchain)");
  opts.optflag("v", "verbose-assembly", "annotate the emitted C with source line comments");
  opts.optflag("", "dump-tokens", "print the token stream");
  opts.optflag("", "dump-ast", "print the parse tree");
  opts.optflag("", "dump-typed", "print the typed tree");
  opts.optflag("", "dump-opt", "print the optimised tree");
  opts.optflag("h", "help", "print this help menu");

  let matches = match opts.parse(&args[1..]) {
    Ok(matches) => matches,
    Err(err) => {
      eprintln!("{program_name}: {err}");
      process::exit(2);
    }
  };

  if matches.opt_present("h") {
    print!(
      "{}",
      opts.usage(&format!("Usage: {program_name} [options] FILENAME"))
    );
    return;
  }

  let Some(filename) = matches.free.first().cloned() else {
    eprintln!("{program_name}: no input file (try -h)");
    process::exit(2);
  };

  let opt_level = match matches.opt_str("O").as_deref() {
    None | Some("0") => 0,
    Some("1") => 1,
    Some("2") => 2,
    Some(other) => {
      eprintln!("{program_name}: invalid optimisation level '{other}'");
      process::exit(2);
    }
  };

  let source = match fs::read_to_string(&filename) {
    Ok(source) => source,
    Err(err) => {
      let error = CompileError::io(format!("cannot read source: {err}"));
      eprintln!("{}", error.report(&filename));
      process::exit(error.exit_code());
    }
  };

  if let Err(error) = run(&filename, &source, opt_level, &matches) {
    eprintln!("{}", error.report(&filename));
    process::exit(error.exit_code());
  }
}

fn run(filename: &str, source: &str, opt_level: u8, matches: &Matches) -> CompileResult<()> {
  let options = Options {
    opt_level,
    verbose: matches.opt_present("v"),
    include_runtime: !matches.opt_present("R"),
  };

  let tokens = scanner::scan(source)?;
  if matches.opt_present("dump-tokens") {
    for token in &tokens {
      println!("{token:?}");
    }
  }

  let mut program = parser::parse(tokens)?;
  if matches.opt_present("dump-ast") {
    println!("{program:#?}");
  }

  let symbols = typecheck::check(&mut program, options.include_runtime)?;
  if matches.opt_present("dump-typed") {
    println!("{program:#?}");
  }

  optimizer::optimize(&mut program, &symbols, options.opt_level);
  if matches.opt_present("dump-opt") {
    println!("{program:#?}");
  }

  let c_source = codegen::generate(&program, &symbols, options.verbose);

  let input = Path::new(filename);
  let c_file = driver::c_filename(input);
  driver::write_c_file(&c_file, &c_source)?;

  if matches.opt_present("c") {
    return Ok(());
  }

  let output = matches
    .opt_str("o")
    .unwrap_or_else(|| driver::default_output(input));
  driver::build_executable(&c_file, &output, options.include_runtime)?;
  driver::remove_c_file(&c_file);
  Ok(())
}

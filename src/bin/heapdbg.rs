use std::io::Write;

use anyhow::Result;
use clap::Parser;

use heapdbg::dump::{dump, DumpOptions};
use heapdbg::heap::{Heap, MemoryReader};
use heapdbg::report::Report;
use heapdbg::HeapSnapshot;

#[derive(Debug, Parser)]
struct Heapdbg {
    filename: std::path::PathBuf,
    /// Run one command and exit instead of starting the shell.
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    let args = Heapdbg::parse();

    let input = std::fs::File::open(&args.filename)?;
    let snapshot = heapdbg::load_snapshot(input)?;

    let mut ctx = Ctx {
        snapshot,
        memory_attached: true,
        color: args.command.is_empty(),
    };

    if !args.command.is_empty() {
        let cmd = &args.command[0];
        let rest = args.command[1..].join(" ");
        run_command(&mut ctx, cmd, &rest);
        return Ok(());
    }

    println!("Loaded; {} types, {} objects in snapshot.",
        ctx.snapshot.types().count(),
        ctx.snapshot.object_count(),
    );
    println!("To quit: ^D or exit");

    let mut rl = rustyline::Editor::<(), _>::new()?;
    let prompt = ansi_term::Colour::Green.paint(">> ").to_string();
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                let (cmd, rest) = line.split_once(char::is_whitespace)
                    .unwrap_or((line, ""));
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                if cmd == "exit" {
                    break;
                }
                run_command(&mut ctx, cmd, rest);
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(e) => {
                println!("{:?}", e);
                break;
            }
        }
    }

    Ok(())
}

fn run_command(ctx: &mut Ctx, cmd: &str, rest: &str) {
    if cmd == "help" {
        println!("commands:");
        let name_len = COMMANDS.iter()
            .map(|(name, _, _)| name.len())
            .max()
            .unwrap_or(12);
        for (name, _, desc) in COMMANDS {
            println!("{:name_len$} {}", name, desc);
        }
        return;
    }
    for (name, imp, _) in COMMANDS {
        if name.split('|').any(|n| n == cmd) {
            imp(ctx, rest);
            return;
        }
    }
    println!("unknown command: {}", cmd);
    println!("for help, try: help");
}

struct Ctx {
    snapshot: HeapSnapshot,
    /// Whether inline values can be dumped.
    memory_attached: bool,
    color: bool,
}

impl Ctx {
    fn memory(&self) -> Option<&dyn MemoryReader> {
        if self.memory_attached {
            Some(&self.snapshot)
        } else {
            None
        }
    }
}

type Command = fn(&mut Ctx, &str);

static COMMANDS: &[(&str, Command, &str)] = &[
    ("dump|yd", cmd_dump, "decode fields of an object, or of every object of a type"),
    ("types", cmd_types, "print names of ALL types, or types containing a string"),
    ("load", cmd_load, "loads additional segment data"),
    ("memory", cmd_memory, "attach or detach the memory reader used for value dumps"),
];

#[derive(Debug, Parser)]
#[clap(name = "dump", no_binary_name = true)]
struct DumpArgs {
    /// The address of an object.
    #[clap(short = 'a', long)]
    address: Option<String>,
    /// Comma separated fields to show for the object.
    #[clap(short = 'f', long, alias = "fl")]
    fields: Option<String>,
    /// Show progress messages.
    #[clap(short = 'v', long)]
    verbose: bool,
    /// Process all objects whose type has this identity (method table).
    #[clap(short = 'm', long = "by-mt", alias = "byMT")]
    by_mt: Option<String>,
}

fn cmd_dump(ctx: &mut Ctx, args: &str) {
    let args = match DumpArgs::try_parse_from(args.split_whitespace()) {
        Ok(a) => a,
        Err(e) => {
            let _ = e.print();
            return;
        }
    };
    let options = DumpOptions {
        address: args.address,
        fields: args.fields,
        by_type: args.by_mt,
    };

    let stdout = std::io::stdout();
    let mut report = Report::new(stdout.lock())
        .with_verbose(args.verbose)
        .with_color(ctx.color);
    if let Err(e) = dump(&ctx.snapshot, ctx.memory(), &options, &mut report) {
        println!("{} {e}", ansi_term::Colour::Red.paint("error writing output:"));
    }
    let _ = report.into_inner().flush();
}

fn cmd_types(ctx: &mut Ctx, args: &str) {
    let args = args.trim();
    // Sorted copy, because alphabetical order seems polite.
    let mut types_copy = ctx.snapshot.types()
        .filter(|ty| args.is_empty() || ty.name.contains(args))
        .collect::<Vec<_>>();
    types_copy.sort_by(|a, b| a.name.cmp(&b.name));

    if types_copy.is_empty() {
        println!("{}", ansi_term::Colour::Red.paint("No types found."));
        return;
    }

    let dim = ansi_term::Style::new().dimmed();
    for ty in types_copy {
        let count = ctx.snapshot.objects()
            .filter(|o| o.ty.identity == ty.identity)
            .count();
        println!("{} {} ({} fields, {} instances)",
            dim.paint(ty.identity.to_string()),
            ty.name,
            ty.fields.len(),
            count,
        );
    }
}

fn cmd_load(ctx: &mut Ctx, args: &str) {
    let args = args.trim();
    let words = args.split_whitespace().collect::<Vec<_>>();
    if words.len() != 2 {
        println!("usage: load [filename] [address]");
        return;
    }
    let filename = words[0];
    let address = match parse_int::parse::<u64>(words[1]) {
        Ok(a) => a,
        Err(e) => {
            println!("bad address: {e}");
            return;
        }
    };

    let image = match std::fs::read(filename) {
        Ok(bytes) => bytes,
        Err(e) => {
            println!("unable to read file: {e}");
            return;
        }
    };

    let len = image.len();
    ctx.snapshot.insert_segment(address, image, filename);
    println!("loaded {len} bytes at {address:#x}");
}

fn cmd_memory(ctx: &mut Ctx, args: &str) {
    match args.trim() {
        "" => (),
        "on" => ctx.memory_attached = true,
        "off" => ctx.memory_attached = false,
        _ => {
            println!("usage: memory {{on|off}}");
            return;
        }
    }
    if ctx.memory_attached {
        println!("memory reader attached");
    } else {
        println!("memory reader detached; value fields will dump empty");
    }
}

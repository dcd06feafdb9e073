use clap::Parser;
use anyhow::Result;
use std::path::PathBuf;

use heapdbg::heap::Heap;

#[derive(Debug, Parser)]
struct Snaptool {
    #[clap(subcommand)]
    sub: Sub,
}

#[derive(Debug, Parser)]
enum Sub {
    List {
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Snaptool::parse();
    match args.sub {
        Sub::List { path } => {
            let file = std::fs::File::open(&path)?;
            let snapshot = heapdbg::load_snapshot(file)?;

            println!("format version {}, heap {}walkable",
                snapshot.format_version(),
                if snapshot.can_walk_heap() { "" } else { "not " },
            );

            let mut addr_width = 8 + 2;
            for (range, _) in snapshot.ranges() {
                if *range.start() > u64::from(u32::MAX) || *range.end() > u64::from(u32::MAX) {
                    addr_width = 16 + 2;
                }
            }
            println!("{:addr_width$}     {:addr_width$}   {}",
                "START", "END", "SOURCE");
            for (range, segment) in snapshot.ranges() {
                let base = range.start();
                let end = range.end();
                let name = &segment.name;
                println!("{base:#0addr_width$x} ..= {end:#0addr_width$x}   {name}");
            }

            println!();
            println!("{:16}   {:>9}   {}", "TYPE", "INSTANCES", "NAME");
            for ty in snapshot.types() {
                let count = snapshot.objects()
                    .filter(|o| o.ty.identity == ty.identity)
                    .count();
                println!("{}   {count:>9}   {}", ty.identity, ty.name);
            }
        }
    }
    Ok(())
}

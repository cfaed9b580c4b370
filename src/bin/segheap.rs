extern crate segheap;

use std::process;

use clap::Parser;
use log::info;

use segheap::driver::options::SegheapCli;
use segheap::driver::statistics::Statistics;
use segheap::driver::workload::Workload;
use segheap::model::Runtime;

pub fn main() {
    env_logger::init();
    let opt = SegheapCli::parse();

    let config = opt.heap_config();
    info!("heap configuration: {:?}", config);

    let mut runtime = match Runtime::new(config) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{e}");
            process::exit(2)
        }
    };

    let mut workload = Workload::new(opt.workload());
    let result = workload.run(&mut runtime);

    if opt.dump_heap {
        eprintln!("{:?}", runtime.heap());
    }

    match result {
        Ok(statistics) => exit(&opt, 0, &statistics),
        Err(e) => {
            eprintln!("{e}");
            exit(&opt, 1, &Statistics::default())
        }
    }
}

/// Optionally dump stats to stderr then exit
pub fn exit(opts: &SegheapCli, code: i32, stats: &Statistics) {
    if opts.statistics {
        eprintln!();
        eprintln!("~~~~~~~~~~");
        eprintln!("STATISTICS");
        eprintln!("~~~~~~~~~~");
        eprintln!();
        eprintln!("{stats}");
    }
    process::exit(code)
}

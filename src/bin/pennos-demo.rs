//! Minimal non-interactive driver exercising `mkfs`/`mount`/`ls`, a couple of
//! kernel calls, and the scheduler's run loop, standing in for the
//! interactive shell (out of scope for this crate, see SPEC_FULL.md §1). Not
//! a shell: takes no commands, just proves the core boots, a file
//! round-trips, and the scheduler idles out to its documented exit code once
//! every spawned task has run to completion.

use std::env;
use std::io;

use pennos_core::{FileSystem, Kernel, Logger, OpenMode, TaskStep, VecLogSink, Whence};

/// A task that just yields a fixed number of times before exiting, to give
/// the scheduler something to round-robin over several quanta.
fn counter_task(remaining: u32) -> impl FnMut(&mut Kernel) -> TaskStep {
    let mut remaining = remaining;
    move |_k| {
        if remaining == 0 {
            TaskStep::Exit
        } else {
            remaining -= 1;
            TaskStep::Yield
        }
    }
}

/// A task that puts itself to sleep once, then exits on its next turn,
/// exercising `Kernel::sleep`'s "blocked until T + ticks" contract.
fn sleeper_task(ticks: u64) -> impl FnMut(&mut Kernel) -> TaskStep {
    #[derive(Clone, Copy)]
    enum State {
        Start,
        Sleeping,
    }
    let mut state = State::Start;
    move |k| {
        let pid = k.current_pid();
        match state {
            State::Start => {
                k.sleep(pid, ticks).expect("sleep");
                state = State::Sleeping;
                TaskStep::Yield
            }
            State::Sleeping => TaskStep::Exit,
        }
    }
}

fn main() {
    let path = env::args().nth(1).unwrap_or_else(|| "pennos.img".to_string());
    let fs = match FileSystem::mount(&path) {
        Ok(fs) => fs,
        Err(_) => FileSystem::format(&path, 2, 0).expect("mkfs"),
    };

    let logger = Logger::new(Box::new(VecLogSink::default()));
    let mut kernel = Kernel::boot(fs, logger).expect("boot");
    let init = kernel.current_pid();

    let fd = kernel.open(init, "hello.txt", OpenMode::Write).expect("open");
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    kernel.write(init, fd, b"hello from pennos-demo\n", &mut stdout, &mut stderr).expect("write");
    kernel.lseek(init, fd, 0, Whence::Set).expect("lseek");

    let mut stdin = io::empty();
    let data = kernel.read(init, fd, 64, &mut stdin).expect("read");
    print!("{}", String::from_utf8_lossy(&data));
    kernel.close(init, fd).expect("close");

    println!("\ndirectory listing:");
    for entry in kernel.fs.root_dir().list().expect("list") {
        println!("  {:<31} {:>6} bytes", entry.name, entry.size);
    }

    let counter = kernel.spawn("counter", 0, 1, counter_task(3)).expect("spawn counter");
    let sleeper = kernel.spawn("sleeper", 0, 1, sleeper_task(5)).expect("spawn sleeper");
    println!("spawned pid {} (counter) and pid {} (sleeper) as children of {}", counter, sleeper, init);

    // the synchronous work above stood in for `init`'s own body; retiring it
    // here hands the rest of the run to the scheduler, which terminates with
    // EXIT_IDLE once counter and sleeper have both exited.
    kernel.exit(init).expect("exit init");
    let code = kernel.run();
    println!("scheduler idled out after tick {} with exit code {}", kernel.tick, code);
    std::process::exit(code);
}

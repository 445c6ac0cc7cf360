pub fn main() -> miette::Result<()> {
    // The main thread's stack is small on some platforms (1MB on Windows);
    // reconciliation recurses through several async layers per provider, so
    // give it the same headroom as a worker thread instead of trusting the
    // platform default.
    let main_stack_size = std::env::var("RUST_MIN_STACK")
        .ok()
        .and_then(|var| var.parse::<usize>().ok())
        .unwrap_or(0)
        .max(4 * 1024 * 1024);

    let run = move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("failed to build the tokio runtime");
        runtime.block_on(Box::pin(zana::cli::execute()))
    };

    std::thread::Builder::new()
        .name("zana-main".to_string())
        .stack_size(main_stack_size)
        .spawn(run)
        .expect("failed to spawn the main worker thread")
        .join()
        .expect("main worker thread panicked")
}

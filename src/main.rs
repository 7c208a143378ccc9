use anyhow::Result;
use clap::Parser;
use hoap::{HeapConfig, MemoryManager, StructLayout, Value, VERSION};

/// Walk through the hoap heap: allocation, pointer arithmetic, punning,
/// struct fields and misuse detection
#[derive(Parser, Debug)]
#[command(name = "hoap", version)]
struct Cli {
    /// Allocatable bytes the demo heap starts with
    #[arg(long, default_value_t = 64)]
    capacity: usize,

    /// Keep stale bytes in freed blocks instead of zeroing them
    #[arg(long)]
    no_scrub: bool,

    /// Verify allocator invariants after every operation
    #[arg(long)]
    debug_checks: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    println!("hoap heap demo v{}", VERSION);

    let memory = MemoryManager::new();
    let heap = memory.heap_create_with_config(
        HeapConfig::default()
            .with_initial_capacity(cli.capacity)
            .with_scrub_on_free(!cli.no_scrub)
            .with_debug_checks(cli.debug_checks),
    )?;
    println!("Created heap {} with {} bytes", heap, cli.capacity);

    // An array of four ints and some pointer arithmetic
    let int = memory.type_resolve(heap, "i32")?;
    let numbers = memory.alloc(heap, &int, 4)?;
    for i in 0..4 {
        memory.write_value(heap, &numbers.add(i), &Value::I32(10 * (i as i32 + 1)))?;
    }
    let last = numbers.add(3);
    println!("{} = {}", last, memory.read_value(heap, &last)?);
    match memory.read(heap, &numbers.add(4)) {
        Ok(_) => println!("numbers[4] unexpectedly readable"),
        Err(e) => println!("numbers[4]: {}", e),
    }

    // Type punning through a byte array
    let byte = memory.type_resolve(heap, "byte")?;
    let bytes4 = memory.type_register_array(heap, "byte4", &byte, 4)?;
    memory.write_value(heap, &numbers, &Value::I32(0x41424344))?;
    let punned = MemoryManager::cast(&numbers, &bytes4);
    println!("0x41424344 as bytes: {}", memory.read_value(heap, &punned)?);

    // A struct with named fields
    let double = memory.type_resolve(heap, "f64")?;
    let sample = memory.type_register(
        heap,
        "sample",
        StructLayout::new(16).field("id", 0, &int).field("weight", 8, &double),
    )?;
    let record = memory.alloc(heap, &sample, 1)?;
    let weight = MemoryManager::field(&record, "weight")?;
    memory.write_value(heap, &weight, &Value::F64(2.5))?;
    println!("{} = {}", weight, memory.read_value(heap, &weight)?);

    // Misuse is reported, never silently accepted
    memory.free(heap, &numbers)?;
    if let Err(e) = memory.read(heap, &numbers) {
        println!("read after free: {}", e);
    }
    if let Err(e) = memory.free(heap, &numbers) {
        println!("second free: {}", e);
    }

    let grown = memory.realloc(heap, &record, 8)?;
    let stats = memory.stats(heap)?;
    println!(
        "Heap stats: capacity {} bytes, {} live allocations, {} bytes free in {} regions, grown {} times",
        stats.capacity, stats.live_allocations, stats.free_bytes, stats.free_regions, stats.grow_count
    );

    memory.free(heap, &grown)?;
    memory.heap_destroy(heap)?;
    println!("Heap {} destroyed", heap);
    Ok(())
}

use symgraph::{languages, plugins};

pub fn list_languages() {
    println!("Supported languages:");
    for name in languages::SUPPORTED {
        println!("  {}", name);
    }
}

pub fn list_plugins() {
    println!("Built-in plugins:");
    for name in plugins::BUILTIN {
        println!("  {}", name);
    }
}

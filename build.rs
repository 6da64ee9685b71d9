fn main() {
    // Rebuild if any of the simulation kernels change
    println!("cargo:rerun-if-changed=shaders/init_indices.wgsl");
    println!("cargo:rerun-if-changed=shaders/reset_values.wgsl");
    println!("cargo:rerun-if-changed=shaders/morton.wgsl");
    println!("cargo:rerun-if-changed=shaders/dead_compact.wgsl");
    println!("cargo:rerun-if-changed=shaders/radix_sort.wgsl");
    println!("cargo:rerun-if-changed=shaders/tree_build.wgsl");
    println!("cargo:rerun-if-changed=shaders/reduce.wgsl");
    println!("cargo:rerun-if-changed=shaders/queue_arm.wgsl");
    println!("cargo:rerun-if-changed=shaders/force.wgsl");
    println!("cargo:rerun-if-changed=shaders/merge_bodies.wgsl");
}

mod buffer_tests;
mod gate_tests;
mod resource_tests;

mod pipeline_test;
mod scheduler_test;

pub mod radix_queue;

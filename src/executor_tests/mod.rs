mod async_resolvers;
mod batching;
mod errors;
mod field_execution;
